//! Failures of a reconciliation pass.

use std::time::Duration;

use thiserror::Error;

use crate::cluster::ClusterError;
use crate::graph::GraphError;
use crate::topology::TopologyError;

/// Errors that abort a reconciliation run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The requested state is inconsistent and was rejected before touching the cluster.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// The traffic graph cannot be built for the requested workload count.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A cluster call failed. Resources mutated before the failure are left in place.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// A workload kept changing underneath us while pushing its configuration.
    #[error("giving up on updating `{workload}` after {attempts} conflicting attempts")]
    ConflictExhausted {
        /// Name of the workload.
        workload: String,
        /// Number of attempts made.
        attempts: usize,
    },

    /// The freshly created namespace did not report itself as active.
    #[error("namespace `{0}` is not active yet")]
    NamespaceNotReady(String),

    /// Update mode was requested for a namespace without a topology record.
    #[error("namespace `{0}` has no recorded topology, create it first")]
    NamespaceNotFound(String),

    /// The topology document could not be loaded.
    #[error("failed to load topology")]
    Persistence(#[source] TopologyError),

    /// The cluster was reconciled but the new topology could not be recorded.
    ///
    /// The cluster and the topology document disagree until the next successful run.
    #[error("cluster was reconciled but saving the topology failed; the recorded topology is stale")]
    PersistenceAfterReconcile(#[source] TopologyError),

    /// The caller's deadline elapsed before the run completed.
    #[error("reconciliation did not finish within {0:?}")]
    DeadlineExceeded(Duration),
}

/// Result type for reconciliation.
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
