//! Creation of fresh namespaces for new meshes.

use uuid::Uuid;

use crate::cluster::{Cluster, NamespacePhase};
use crate::error::{ReconcileError, Result};

/// Prefix of every generated namespace name.
const NAMESPACE_PREFIX: &str = "kubreed-";

/// Generates a unique namespace name that is a valid DNS label.
pub fn generate_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{NAMESPACE_PREFIX}{}", &id[..20])
}

/// Creates a new namespace and checks once that it is active.
///
/// The readiness check is not retried. A namespace that is still pending right
/// after creation is reported as [`ReconcileError::NamespaceNotReady`].
pub async fn provision(cluster: &dyn Cluster) -> Result<String> {
    let name = generate_name();

    tracing::info!(namespace = %name, "creating namespace");
    cluster.create_namespace(&name).await?;

    match cluster.namespace_phase(&name).await? {
        NamespacePhase::Active => {
            tracing::info!(namespace = %name, "created namespace");
            Ok(name)
        }
        phase => {
            tracing::warn!(namespace = %name, ?phase, "namespace is not active");
            Err(ReconcileError::NamespaceNotReady(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InMemoryCluster;

    #[test]
    fn names_are_dns_labels() {
        let name = generate_name();
        assert!(name.len() <= 63);
        assert!(name.starts_with(NAMESPACE_PREFIX));
        assert!(
            name.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        );
        assert_ne!(name, generate_name());
    }

    #[tokio::test]
    async fn provisions_active_namespace() {
        let cluster = InMemoryCluster::new();
        let name = provision(&cluster).await.unwrap();

        assert_eq!(
            cluster.namespace_phase(&name).await.unwrap(),
            NamespacePhase::Active
        );
    }

    #[tokio::test]
    async fn pending_namespace_is_not_ready() {
        let cluster = InMemoryCluster::new();
        cluster.set_initial_phase(NamespacePhase::Pending);

        let err = provision(&cluster).await.unwrap_err();
        assert!(matches!(err, ReconcileError::NamespaceNotReady(_)));
    }
}
