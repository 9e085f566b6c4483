//! The resource API of the cluster hosting the workloads.
//!
//! The reconciler only talks to the cluster through the [`Cluster`] trait. Two
//! implementations are provided:
//!
//! - [`InMemoryCluster`] keeps all resources in a shared map. It is used by the
//!   tests and by dry runs of the CLI.
//! - [`KubeCluster`] talks to a Kubernetes API server over HTTP, using the
//!   credentials of a kubeconfig file.

use std::fmt::Debug;

use thiserror::Error;

use crate::config::WorkloadConfig;

mod in_memory;
mod kube;

pub use in_memory::{ClusterCall, InMemoryCluster};
pub use kube::{KubeCluster, Kubeconfig};

/// A type-erased [`Cluster`] instance.
pub type BoxedCluster = Box<dyn Cluster>;

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors returned by the cluster resource API.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The update was based on a stale resource version.
    #[error("conflicting update of `{name}`: the resource was modified concurrently")]
    Conflict {
        /// Name of the resource.
        name: String,
    },

    /// The addressed resource does not exist.
    #[error("{kind} `{name}` not found")]
    NotFound {
        /// Kind of the resource, e.g. `deployment`.
        kind: &'static str,
        /// Name of the resource.
        name: String,
    },

    /// Any other failure of the cluster API.
    #[error("cluster API error: {context}")]
    Api {
        /// What was attempted.
        context: String,
        /// Underlying error.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ClusterError {
    /// Whether the error signals an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub(crate) fn api(
        context: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Api {
            context: context.into(),
            cause: cause.into(),
        }
    }
}

/// Lifecycle phase of a namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamespacePhase {
    /// The namespace accepts new resources.
    Active,
    /// The namespace is being deleted.
    Terminating,
    /// The phase has not been reported yet.
    Pending,
}

/// Desired state of a single workload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadSpec {
    /// Name of the deployment, also used for its service endpoint.
    pub name: String,
    /// Namespace owning the workload.
    pub namespace: String,
    /// Number of pods backing the workload.
    pub replicas: u32,
    /// Container image running `kubreed-http`.
    pub image: String,
    /// Configuration delivered to the workload process.
    pub config: WorkloadConfig,
}

/// A workload as stored in the cluster, including its version for optimistic updates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadResource {
    /// The current state of the workload.
    pub spec: WorkloadSpec,
    /// Opaque version identifier, compared on update.
    pub resource_version: String,
}

/// Resource operations the reconciler needs from a cluster.
///
/// All calls are awaited one at a time by the reconciler.
#[async_trait::async_trait]
pub trait Cluster: Debug + Send + Sync + 'static {
    /// Creates a namespace with the given name.
    async fn create_namespace(&self, name: &str) -> ClusterResult<()>;

    /// Returns the current phase of a namespace.
    async fn namespace_phase(&self, name: &str) -> ClusterResult<NamespacePhase>;

    /// Creates a workload deployment.
    async fn create_workload(&self, spec: &WorkloadSpec) -> ClusterResult<()>;

    /// Fetches the latest version of a workload deployment.
    async fn get_workload(&self, name: &str, namespace: &str) -> ClusterResult<WorkloadResource>;

    /// Replaces a workload deployment.
    ///
    /// Fails with [`ClusterError::Conflict`] if `resource.resource_version` is stale.
    async fn update_workload(&self, resource: &WorkloadResource) -> ClusterResult<()>;

    /// Deletes a workload deployment.
    async fn delete_workload(&self, name: &str, namespace: &str) -> ClusterResult<()>;

    /// Creates the service endpoint routing to the workload of the same name.
    async fn create_service_endpoint(&self, name: &str, namespace: &str) -> ClusterResult<()>;

    /// Deletes a service endpoint.
    async fn delete_service_endpoint(&self, name: &str, namespace: &str) -> ClusterResult<()>;
}
