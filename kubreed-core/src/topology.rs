//! Persisted traffic graphs, one [`TopologyRecord`] per namespace.
//!
//! All records of a cluster live in a single YAML document named after the cluster:
//!
//! ```yaml
//! - namespace: kubreed-6f1c2a
//!   pattern:
//!   - source: app-0
//!     destination: [app-3, app-1]
//!   - source: app-1
//!     destination: [app-0, app-2]
//! ```
//!
//! The document is loaded in full at the start of a run and rewritten in full at the end.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or saving the topology document.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The document could not be read or written.
    #[error("failed to access topology file `{}`", path.display())]
    Io {
        /// Location of the topology document.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        cause: std::io::Error,
    },

    /// The document is not a valid topology list.
    #[error("failed to parse topology file `{}`", path.display())]
    Parse {
        /// Location of the topology document.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        cause: serde_yaml::Error,
    },

    /// The records could not be serialized.
    #[error("failed to serialize topology")]
    Serialize(#[source] serde_yaml::Error),
}

/// The outgoing edges of a single workload.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct WorkloadEdge {
    /// Name of the workload issuing requests.
    pub source: String,
    /// Names of the workloads receiving requests, in dispatch order.
    pub destination: Vec<String>,
}

impl WorkloadEdge {
    /// Creates an edge without any destinations, used for freshly created workloads.
    pub fn placeholder(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: Vec::new(),
        }
    }
}

/// The traffic graph of a single namespace.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TopologyRecord {
    /// The namespace owning the workloads.
    pub namespace: String,
    /// Edges indexed by workload: `pattern[i]` belongs to `app-i`.
    #[serde(default)]
    pub pattern: Vec<WorkloadEdge>,
}

impl TopologyRecord {
    /// Creates an empty record for a namespace that has no workloads yet.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pattern: Vec::new(),
        }
    }

    /// The number of workloads currently recorded for this namespace.
    pub fn workload_count(&self) -> usize {
        self.pattern.len()
    }

    /// Parses a list of records from a YAML document.
    pub fn parse_all(yaml: &str) -> Result<Vec<Self>, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_yaml::from_str(yaml)
    }

    /// Serializes a list of records into a YAML document.
    pub fn serialize_all(records: &[Self]) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(records)
    }
}

/// File-backed storage of all [`TopologyRecord`]s of a cluster.
#[derive(Debug, Clone)]
pub struct TopologyStore {
    path: PathBuf,
}

impl TopologyStore {
    /// Creates a store for `cluster` inside `directory`.
    pub fn new(directory: &Path, cluster: &str) -> Self {
        Self {
            path: directory.join(format!("{cluster}.yaml")),
        }
    }

    /// Location of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every record, returning an empty list if the document does not exist yet.
    pub async fn load(&self) -> Result<Vec<TopologyRecord>, TopologyError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no topology file yet");
                return Ok(Vec::new());
            }
            Err(cause) => return Err(self.io_error(cause)),
        };

        TopologyRecord::parse_all(&contents).map_err(|cause| TopologyError::Parse {
            path: self.path.clone(),
            cause,
        })
    }

    /// Replaces the document with the given records.
    ///
    /// The new contents are written next to the target and renamed into place, so a crash never
    /// leaves a truncated document behind.
    pub async fn save(&self, records: &[TopologyRecord]) -> Result<(), TopologyError> {
        let contents = TopologyRecord::serialize_all(records).map_err(TopologyError::Serialize)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|cause| self.io_error(cause))?;
        }

        let staging = self.path.with_extension("yaml.tmp");
        tokio::fs::write(&staging, contents)
            .await
            .map_err(|cause| self.io_error(cause))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|cause| self.io_error(cause))?;

        tracing::debug!(path = %self.path.display(), records = records.len(), "saved topology");
        Ok(())
    }

    fn io_error(&self, cause: std::io::Error) -> TopologyError {
        TopologyError::Io {
            path: self.path.clone(),
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TopologyRecord {
        TopologyRecord {
            namespace: "kubreed-test".into(),
            pattern: vec![
                WorkloadEdge {
                    source: "app-0".into(),
                    destination: vec!["app-2".into(), "app-1".into()],
                },
                WorkloadEdge {
                    source: "app-1".into(),
                    destination: vec!["app-0".into(), "app-2".into()],
                },
                WorkloadEdge {
                    source: "app-2".into(),
                    destination: vec!["app-1".into(), "app-0".into()],
                },
            ],
        }
    }

    #[test]
    fn parses_document_layout() {
        let yaml = "\
- namespace: ns-a
  pattern:
  - source: app-0
    destination: [app-1]
  - source: app-1
    destination: [app-0]
- namespace: ns-b
  pattern: []
";
        let records = TopologyRecord::parse_all(yaml).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].namespace, "ns-a");
        assert_eq!(records[0].pattern[1].destination, vec!["app-0"]);
        assert_eq!(records[1].workload_count(), 0);
    }

    #[test]
    fn empty_document_has_no_records() {
        assert!(TopologyRecord::parse_all("").unwrap().is_empty());
        assert!(TopologyRecord::parse_all("\n  \n").unwrap().is_empty());
    }

    #[test]
    fn serialized_records_parse_back() {
        let yaml = TopologyRecord::serialize_all(&[record()]).unwrap();
        let parsed = TopologyRecord::parse_all(&yaml).unwrap();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].namespace, "kubreed-test");
        let sources: Vec<_> = parsed[0].pattern.iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, ["app-0", "app-1", "app-2"]);
        for (original, parsed) in record().pattern.iter().zip(&parsed[0].pattern) {
            let mut expected = original.destination.clone();
            let mut actual = parsed.destination.clone();
            expected.sort();
            actual.sort();
            assert_eq!(expected, actual);
        }
    }

    #[tokio::test]
    async fn store_loads_empty_without_file() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = TopologyStore::new(tempdir.path(), "kind-dev");

        assert!(store.load().await.unwrap().is_empty());
        assert_eq!(store.path(), tempdir.path().join("kind-dev.yaml"));
    }

    #[tokio::test]
    async fn store_rewrites_document() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = TopologyStore::new(tempdir.path(), "kind-dev");

        store.save(&[record()]).await.unwrap();
        assert_eq!(store.load().await.unwrap(), vec![record()]);

        store.save(&[]).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
        assert!(!tempdir.path().join("kind-dev.yaml.tmp").exists());
    }

    #[tokio::test]
    async fn store_reports_malformed_document() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = TopologyStore::new(tempdir.path(), "broken");
        std::fs::write(store.path(), "namespace: [unterminated").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, TopologyError::Parse { .. }));
    }
}
