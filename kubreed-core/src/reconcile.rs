//! Drives a namespace towards the desired number of workloads and wiring.
//!
//! A pass over one namespace moves through the [`Phase`]s
//! `Idle → {ScalingDown | ScalingUp | NoOp} → Regenerating → Publishing → Idle`:
//!
//! 1. Workloads beyond the desired count are deleted, missing ones are created
//!    with an empty list of remote services.
//! 2. If the count changed, the edges of *every* workload are rebuilt. The graph
//!    is never patched, so no edge can point at a deleted workload. An unchanged
//!    count keeps the recorded graph as long as it is still valid.
//! 3. Every workload receives its configuration through an optimistic update,
//!    retried with backoff on version conflicts.
//!
//! The record passed to [`Reconciler::reconcile`] is only replaced once all
//! three steps succeeded. [`Reconciler::run`] wraps passes with loading and
//! saving the [`TopologyStore`].

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use rand::Rng;
use rand::rngs::SmallRng;

use crate::cluster::{BoxedCluster, WorkloadSpec};
use crate::config::WorkloadConfig;
use crate::error::{ReconcileError, Result};
use crate::graph;
use crate::namespace;
use crate::topology::{TopologyRecord, TopologyStore, WorkloadEdge};
use crate::workload_name;

/// Steps of a reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// No pass in progress.
    #[default]
    Idle,
    /// Deleting workloads beyond the desired count.
    ScalingDown,
    /// Creating missing workloads.
    ScalingUp,
    /// The workload count already matches.
    NoOp,
    /// Rebuilding the traffic graph.
    Regenerating,
    /// Pushing configurations to the workloads.
    Publishing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ScalingDown => "scaling-down",
            Self::ScalingUp => "scaling-up",
            Self::NoOp => "no-op",
            Self::Regenerating => "regenerating",
            Self::Publishing => "publishing",
        };
        f.write_str(name)
    }
}

/// The state a namespace should be driven to.
#[derive(Clone, Debug)]
pub struct DesiredState {
    /// Number of workloads in the namespace.
    pub workloads: usize,
    /// Pods per workload.
    pub replicas: u32,
    /// Downstream workloads per workload.
    pub branching: usize,
    /// Container image running `kubreed-http`.
    pub image: String,
    /// Traffic settings shared by all workloads. The remote services are filled in per workload.
    pub config: WorkloadConfig,
}

impl DesiredState {
    /// Rejects inputs that can never produce traffic.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| Err(ReconcileError::Validation(message.to_owned()));
        let config = &self.config;

        if self.workloads < 1 {
            return invalid("at least 1 workload is needed per namespace");
        }
        if self.replicas < 1 {
            return invalid("at least 1 pod is needed per workload");
        }
        if config.api_count < 1 {
            return invalid("at least 1 API is needed per workload");
        }
        if config.pii_percent < 1
            || config.attack_percent < 1
            || config.user_percent < 1
            || config.categorized_percent().is_none_or(|sum| sum > 100)
        {
            return invalid("PII/attack/user percentages must each be at least 1 and sum to at most 100");
        }
        if config.rps == 0 || self.branching == 0 || config.response_time.is_zero() {
            return invalid("rps, branching and latency must all be non-zero for traffic to happen");
        }
        Ok(())
    }
}

/// Retry settings for conflicting workload updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of update attempts per workload.
    pub attempts: usize,
    /// Pause after the first conflict.
    pub initial_backoff: Duration,
    /// Multiplier applied to the pause after every further conflict.
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_backoff: Duration::from_millis(10),
            factor: 2,
        }
    }
}

/// Which namespaces a [`Reconciler::run`] operates on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Provision the given number of new namespaces.
    Create {
        /// Number of namespaces.
        namespaces: usize,
    },
    /// Reconcile a namespace that already has a topology record.
    Update {
        /// Name of the namespace.
        namespace: String,
    },
}

/// What a single pass changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// The reconciled namespace.
    pub namespace: String,
    /// The scaling step taken by the pass.
    pub phase: Phase,
    /// Workloads created in this pass.
    pub created: Vec<String>,
    /// Workloads deleted in this pass.
    pub deleted: Vec<String>,
    /// Workloads whose configuration was pushed.
    pub updated: Vec<String>,
    /// Whether the traffic graph was rebuilt.
    pub regenerated: bool,
}

/// Reconciles namespaces against a [`Cluster`](crate::Cluster).
///
/// A pass takes the namespace's record by mutable reference, so at most one
/// pass per record can be in flight.
#[derive(Debug)]
pub struct Reconciler<R = SmallRng> {
    cluster: BoxedCluster,
    rng: R,
    retry: RetryPolicy,
}

impl<R> Reconciler<R>
where
    R: Rng + Send,
{
    /// Creates a reconciler drawing the traffic graph from `rng`.
    pub fn new(cluster: BoxedCluster, rng: R) -> Self {
        Self {
            cluster,
            rng,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the retry settings for conflicting updates.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs passes for the target namespaces, saving the store after each one.
    ///
    /// Fails on the first error. Namespaces reconciled before the failure stay
    /// recorded; the failing namespace keeps its previous record.
    pub async fn run(
        &mut self,
        store: &TopologyStore,
        target: &Target,
        desired: &DesiredState,
    ) -> Result<Vec<ReconcileReport>> {
        desired.validate()?;
        graph::ensure_feasible(desired.workloads, desired.branching)?;

        let mut records = store.load().await.map_err(ReconcileError::Persistence)?;
        let mut reports = Vec::new();

        match target {
            Target::Create { namespaces } => {
                for _ in 0..*namespaces {
                    let namespace = namespace::provision(self.cluster.as_ref()).await?;
                    let mut record = TopologyRecord::new(namespace);
                    reports.push(self.reconcile(&mut record, desired).await?);
                    records.push(record);
                    save(store, &records).await?;
                }
            }
            Target::Update { namespace } => {
                tracing::info!(%namespace, "updating workloads");
                let record = records
                    .iter_mut()
                    .find(|record| &record.namespace == namespace)
                    .ok_or_else(|| ReconcileError::NamespaceNotFound(namespace.clone()))?;
                reports.push(self.reconcile(record, desired).await?);
                save(store, &records).await?;
            }
        }

        Ok(reports)
    }

    /// Reconciles a single namespace.
    ///
    /// `record` is left untouched unless the whole pass succeeds.
    #[tracing::instrument(level = "info", skip_all, fields(namespace = %record.namespace))]
    pub async fn reconcile(
        &mut self,
        record: &mut TopologyRecord,
        desired: &DesiredState,
    ) -> Result<ReconcileReport> {
        graph::ensure_feasible(desired.workloads, desired.branching)?;

        let namespace = record.namespace.as_str();
        let current = record.workload_count();
        let target = desired.workloads;
        let mut pattern = record.pattern.clone();
        let mut report = ReconcileReport {
            namespace: namespace.to_owned(),
            ..Default::default()
        };

        let phase = match current.cmp(&target) {
            std::cmp::Ordering::Greater => Phase::ScalingDown,
            std::cmp::Ordering::Less => Phase::ScalingUp,
            std::cmp::Ordering::Equal => Phase::NoOp,
        };
        tracing::debug!(%phase, current, target);
        report.phase = phase;

        match phase {
            Phase::ScalingDown => {
                for index in target..current {
                    let name = workload_name(index);
                    self.delete_workload(&name, namespace).await?;
                    report.deleted.push(name);
                }
                pattern.truncate(target);
            }
            Phase::ScalingUp => {
                for index in current..target {
                    let name = workload_name(index);
                    self.create_workload(&name, namespace, desired).await?;
                    pattern.push(WorkloadEdge::placeholder(name.clone()));
                    report.created.push(name);
                }
            }
            _ => {}
        }

        if phase != Phase::NoOp || !is_valid_graph(&pattern, target, desired.branching) {
            tracing::debug!(phase = %Phase::Regenerating);
            pattern = graph::generate_topology(target, desired.branching, &mut self.rng)?;
            report.regenerated = true;
        }

        tracing::debug!(phase = %Phase::Publishing);
        for edge in &pattern {
            self.publish(namespace, edge, desired).await?;
            report.updated.push(edge.source.clone());
        }

        record.pattern = pattern;
        tracing::info!(
            created = report.created.len(),
            deleted = report.deleted.len(),
            regenerated = report.regenerated,
            "reconciled namespace"
        );
        tracing::debug!(phase = %Phase::Idle);

        Ok(report)
    }

    async fn create_workload(
        &self,
        name: &str,
        namespace: &str,
        desired: &DesiredState,
    ) -> Result<()> {
        let spec = WorkloadSpec {
            name: name.to_owned(),
            namespace: namespace.to_owned(),
            replicas: desired.replicas,
            image: desired.image.clone(),
            config: desired.config.with_remote_services(Vec::new()),
        };

        tracing::info!(workload = name, "creating workload");
        self.cluster.create_workload(&spec).await?;
        self.cluster.create_service_endpoint(name, namespace).await?;
        Ok(())
    }

    async fn delete_workload(&self, name: &str, namespace: &str) -> Result<()> {
        tracing::info!(workload = name, "deleting workload");
        self.cluster.delete_workload(name, namespace).await?;
        self.cluster.delete_service_endpoint(name, namespace).await?;
        Ok(())
    }

    /// Pushes the configuration of one workload, retrying on version conflicts.
    async fn publish(
        &self,
        namespace: &str,
        edge: &WorkloadEdge,
        desired: &DesiredState,
    ) -> Result<()> {
        let config = desired.config.with_remote_services(edge.destination.clone());
        let attempts = self.retry.attempts.max(1);
        let mut backoff = self.retry.initial_backoff;

        for attempt in 1..=attempts {
            let mut resource = self.cluster.get_workload(&edge.source, namespace).await?;
            resource.spec.replicas = desired.replicas;
            resource.spec.image = desired.image.clone();
            resource.spec.config = config.clone();

            match self.cluster.update_workload(&resource).await {
                Ok(()) => {
                    tracing::debug!(workload = %edge.source, attempt, "updated workload");
                    return Ok(());
                }
                Err(err) if err.is_conflict() => {
                    tracing::debug!(workload = %edge.source, attempt, "update conflict");
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= self.retry.factor;
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        tracing::error!(workload = %edge.source, attempts, "update conflicts exhausted");
        Err(ReconcileError::ConflictExhausted {
            workload: edge.source.clone(),
            attempts,
        })
    }
}

async fn save(store: &TopologyStore, records: &[TopologyRecord]) -> Result<()> {
    store.save(records).await.map_err(|err| {
        tracing::error!(
            path = %store.path().display(),
            "cluster and recorded topology now disagree"
        );
        ReconcileError::PersistenceAfterReconcile(err)
    })
}

/// Checks that a recorded graph still fits the requested shape.
fn is_valid_graph(pattern: &[WorkloadEdge], workloads: usize, branching: usize) -> bool {
    if pattern.len() != workloads {
        return false;
    }

    let names: BTreeSet<String> = (0..workloads).map(workload_name).collect();
    pattern.iter().enumerate().all(|(index, edge)| {
        let unique: BTreeSet<&String> = edge.destination.iter().collect();
        edge.source == workload_name(index)
            && edge.destination.len() == branching
            && unique.len() == branching
            && !unique.contains(&edge.source)
            && unique.iter().all(|name| names.contains(*name))
    })
}
