//! In-memory cluster for tests and dry runs.
//!
//! This provides a [`Cluster`] backed by shared maps. The cluster is [`Clone`]
//! so tests can keep a handle for inspection while the reconciler owns a boxed
//! copy. Every call is recorded in order, and conflicts or failures can be
//! injected to exercise the retry and abort paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use super::{
    Cluster, ClusterError, ClusterResult, NamespacePhase, WorkloadResource, WorkloadSpec,
};

/// A mutating or reading call received by the [`InMemoryCluster`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterCall {
    /// `create_namespace(name)`
    CreateNamespace(String),
    /// `create_workload(spec.name)`
    CreateWorkload(String),
    /// `get_workload(name)`
    GetWorkload(String),
    /// `update_workload(name)`, including rejected attempts.
    UpdateWorkload(String),
    /// `delete_workload(name)`
    DeleteWorkload(String),
    /// `create_service_endpoint(name)`
    CreateService(String),
    /// `delete_service_endpoint(name)`
    DeleteService(String),
}

impl ClusterCall {
    /// Whether the call creates or deletes a resource.
    pub fn is_create_or_delete(&self) -> bool {
        matches!(
            self,
            Self::CreateNamespace(_)
                | Self::CreateWorkload(_)
                | Self::DeleteWorkload(_)
                | Self::CreateService(_)
                | Self::DeleteService(_)
        )
    }
}

#[derive(Debug, Default)]
struct State {
    namespaces: BTreeMap<String, NamespacePhase>,
    /// Workloads keyed by `(namespace, name)`, with their version counter.
    workloads: BTreeMap<(String, String), (WorkloadSpec, u64)>,
    services: BTreeSet<(String, String)>,
    calls: Vec<ClusterCall>,
    /// Number of upcoming updates to reject per workload name.
    conflicts: HashMap<String, usize>,
    /// Workload names whose creation fails.
    failing_creates: BTreeSet<String>,
    /// Phase reported for namespaces created from now on.
    initial_phase: Option<NamespacePhase>,
}

/// A [`Cluster`] keeping all resources in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCluster {
    state: Arc<Mutex<State>>,
}

impl InMemoryCluster {
    /// Creates an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next `count` updates of the named workload with a conflict.
    pub fn inject_conflicts(&self, name: &str, count: usize) {
        self.lock().conflicts.insert(name.to_owned(), count);
    }

    /// Makes every creation of the named workload fail.
    pub fn fail_create(&self, name: &str) {
        self.lock().failing_creates.insert(name.to_owned());
    }

    /// Reports `phase` for namespaces created after this call.
    pub fn set_initial_phase(&self, phase: NamespacePhase) {
        self.lock().initial_phase = Some(phase);
    }

    /// Returns all calls received so far and clears the log.
    pub fn take_calls(&self) -> Vec<ClusterCall> {
        std::mem::take(&mut self.lock().calls)
    }

    /// Returns the names of all workloads in a namespace, sorted by name.
    pub fn workload_names(&self, namespace: &str) -> Vec<String> {
        self.lock()
            .workloads
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Returns the stored spec of a workload.
    pub fn workload(&self, namespace: &str, name: &str) -> Option<WorkloadSpec> {
        self.lock()
            .workloads
            .get(&(namespace.to_owned(), name.to_owned()))
            .map(|(spec, _)| spec.clone())
    }

    /// Whether a service endpoint exists.
    pub fn has_service(&self, namespace: &str, name: &str) -> bool {
        self.lock()
            .services
            .contains(&(namespace.to_owned(), name.to_owned()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked while holding it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_owned(), name.to_owned())
}

#[async_trait::async_trait]
impl Cluster for InMemoryCluster {
    async fn create_namespace(&self, name: &str) -> ClusterResult<()> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::CreateNamespace(name.to_owned()));
        if state.namespaces.contains_key(name) {
            return Err(ClusterError::api(
                format!("creating namespace `{name}`"),
                "namespace already exists",
            ));
        }
        let phase = state
            .initial_phase
            .clone()
            .unwrap_or(NamespacePhase::Active);
        state.namespaces.insert(name.to_owned(), phase);
        Ok(())
    }

    async fn namespace_phase(&self, name: &str) -> ClusterResult<NamespacePhase> {
        self.lock()
            .namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: "namespace",
                name: name.to_owned(),
            })
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> ClusterResult<()> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::CreateWorkload(spec.name.clone()));
        if state.failing_creates.contains(&spec.name) {
            return Err(ClusterError::api(
                format!("creating deployment `{}`", spec.name),
                "injected failure",
            ));
        }
        let key = key(&spec.namespace, &spec.name);
        if state.workloads.contains_key(&key) {
            return Err(ClusterError::api(
                format!("creating deployment `{}`", spec.name),
                "deployment already exists",
            ));
        }
        state.workloads.insert(key, (spec.clone(), 1));
        Ok(())
    }

    async fn get_workload(&self, name: &str, namespace: &str) -> ClusterResult<WorkloadResource> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::GetWorkload(name.to_owned()));
        let (spec, version) =
            state
                .workloads
                .get(&key(namespace, name))
                .ok_or_else(|| ClusterError::NotFound {
                    kind: "deployment",
                    name: name.to_owned(),
                })?;
        Ok(WorkloadResource {
            spec: spec.clone(),
            resource_version: version.to_string(),
        })
    }

    async fn update_workload(&self, resource: &WorkloadResource) -> ClusterResult<()> {
        let mut state = self.lock();
        let name = resource.spec.name.clone();
        state.calls.push(ClusterCall::UpdateWorkload(name.clone()));

        if let Some(remaining) = state.conflicts.get_mut(&name)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ClusterError::Conflict { name });
        }

        let key = key(&resource.spec.namespace, &name);
        let Some((spec, version)) = state.workloads.get_mut(&key) else {
            return Err(ClusterError::NotFound {
                kind: "deployment",
                name,
            });
        };
        if version.to_string() != resource.resource_version {
            return Err(ClusterError::Conflict { name });
        }
        *spec = resource.spec.clone();
        *version += 1;
        Ok(())
    }

    async fn delete_workload(&self, name: &str, namespace: &str) -> ClusterResult<()> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::DeleteWorkload(name.to_owned()));
        state
            .workloads
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound {
                kind: "deployment",
                name: name.to_owned(),
            })
    }

    async fn create_service_endpoint(&self, name: &str, namespace: &str) -> ClusterResult<()> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::CreateService(name.to_owned()));
        if !state.services.insert(key(namespace, name)) {
            return Err(ClusterError::api(
                format!("creating service `{name}`"),
                "service already exists",
            ));
        }
        Ok(())
    }

    async fn delete_service_endpoint(&self, name: &str, namespace: &str) -> ClusterResult<()> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::DeleteService(name.to_owned()));
        if !state.services.remove(&key(namespace, name)) {
            return Err(ClusterError::NotFound {
                kind: "service",
                name: name.to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::WorkloadConfig;

    fn spec(name: &str) -> WorkloadSpec {
        WorkloadSpec {
            name: name.into(),
            namespace: "ns".into(),
            replicas: 1,
            image: "kubreed-http:test".into(),
            config: WorkloadConfig {
                api_count: 1,
                rps: 1,
                pii_percent: 1,
                attack_percent: 1,
                user_percent: 1,
                response_time: Duration::from_secs(1),
                remote_services: vec![],
            },
        }
    }

    #[tokio::test]
    async fn rejects_stale_versions() {
        let cluster = InMemoryCluster::new();
        cluster.create_workload(&spec("app-0")).await.unwrap();

        let first = cluster.get_workload("app-0", "ns").await.unwrap();
        let mut second = first.clone();
        cluster.update_workload(&first).await.unwrap();

        second.spec.replicas = 4;
        let err = cluster.update_workload(&second).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(cluster.workload("ns", "app-0").unwrap().replicas, 1);
    }

    #[tokio::test]
    async fn injected_conflicts_run_out() {
        let cluster = InMemoryCluster::new();
        cluster.create_workload(&spec("app-0")).await.unwrap();
        cluster.inject_conflicts("app-0", 1);

        let resource = cluster.get_workload("app-0", "ns").await.unwrap();
        assert!(cluster.update_workload(&resource).await.unwrap_err().is_conflict());
        cluster.update_workload(&resource).await.unwrap();
    }

    #[tokio::test]
    async fn deleting_missing_resources_fails() {
        let cluster = InMemoryCluster::new();
        assert!(matches!(
            cluster.delete_workload("app-0", "ns").await,
            Err(ClusterError::NotFound { .. })
        ));
        assert!(matches!(
            cluster.delete_service_endpoint("app-0", "ns").await,
            Err(ClusterError::NotFound { .. })
        ));
    }
}
