//! Topology reconciliation for a synthetic mesh of workloads.
//!
//! The crate builds a randomized directed traffic graph over a flat layer of
//! workloads (see [`graph`]), persists it per namespace (see [`topology`]) and
//! drives a cluster towards the desired number of workloads and their wiring
//! (see [`reconcile`]). Each workload receives its slice of the graph as a
//! [`WorkloadConfig`] which the `kubreed-http` process consumes at startup.
//!
//! The cluster itself is abstracted behind the [`Cluster`] trait. An
//! in-memory implementation is available for tests and dry runs, and a
//! Kubernetes implementation talks to an API server over HTTP.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cluster;
pub mod config;
pub mod error;
pub mod graph;
pub mod namespace;
pub mod observability;
pub mod reconcile;
pub mod topology;

pub use crate::cluster::{Cluster, ClusterError};
pub use crate::config::{CONFIG_ENV_VAR, WorkloadConfig};
pub use crate::error::{ReconcileError, Result};
pub use crate::graph::GraphError;
pub use crate::reconcile::{DesiredState, Reconciler, RetryPolicy};
pub use crate::topology::{TopologyRecord, TopologyStore, WorkloadEdge};

/// Returns the name of the workload (deployment and service) with the given index.
pub fn workload_name(index: usize) -> String {
    format!("app-{index}")
}
