//! The runtime configuration handed to every workload process.
//!
//! The reconciler serializes a [`WorkloadConfig`] to JSON and places it in the
//! [`CONFIG_ENV_VAR`] environment variable of the workload's container. The
//! workload reads it back with [`WorkloadConfig::from_env`] and refuses to start
//! if it is missing or malformed.
//!
//! ```json
//! {
//!   "api_count": 10,
//!   "rps": 1,
//!   "pii_percent": 1,
//!   "attack_percent": 1,
//!   "user_percent": 1,
//!   "response_time": "2s",
//!   "remote_services": ["app-3", "app-1"]
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable carrying the serialized [`WorkloadConfig`].
pub const CONFIG_ENV_VAR: &str = "KUBREED_CONFIG";

/// Errors decoding a [`WorkloadConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The environment variable is not set or not unicode.
    #[error("environment variable `{CONFIG_ENV_VAR}` is not set")]
    Missing,

    /// The payload is not a valid configuration.
    #[error("malformed workload configuration")]
    Malformed(#[from] serde_json::Error),

    /// The payload parsed but violates a constraint.
    #[error("invalid workload configuration: {0}")]
    Invalid(&'static str),
}

/// Per-workload traffic settings and downstream edges.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct WorkloadConfig {
    /// Number of API endpoints served and called per peer.
    pub api_count: usize,
    /// Outgoing requests per second.
    pub rps: usize,
    /// Percentage of requests carrying a PII payload.
    pub pii_percent: usize,
    /// Percentage of requests carrying an attack payload.
    pub attack_percent: usize,
    /// Percentage of requests carrying a benign user payload.
    pub user_percent: usize,
    /// Upper bound for the simulated response time of each API.
    #[serde(with = "humantime_serde")]
    pub response_time: Duration,
    /// Downstream workloads, matching the workload's edge in the topology.
    #[serde(default)]
    pub remote_services: Vec<String>,
}

impl WorkloadConfig {
    /// Reads and validates the configuration from [`CONFIG_ENV_VAR`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let json = std::env::var(CONFIG_ENV_VAR).map_err(|_| ConfigError::Missing)?;
        Self::from_json(&json)
    }

    /// Parses and validates a JSON payload.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration into its transport payload.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Sum of all categorized traffic percentages, or `None` if it overflows.
    pub fn categorized_percent(&self) -> Option<usize> {
        self.pii_percent
            .checked_add(self.attack_percent)?
            .checked_add(self.user_percent)
    }

    /// Returns a copy of this configuration that targets the given workloads.
    pub fn with_remote_services(&self, remote_services: Vec<String>) -> Self {
        Self {
            remote_services,
            ..self.clone()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.categorized_percent().is_none_or(|sum| sum > 100) {
            return Err(ConfigError::Invalid("traffic percentages exceed 100"));
        }
        if self.rps == 0 {
            return Err(ConfigError::Invalid("rps must be non-zero"));
        }
        if self.response_time.is_zero() {
            return Err(ConfigError::Invalid("response time must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkloadConfig {
        WorkloadConfig {
            api_count: 2,
            rps: 5,
            pii_percent: 3,
            attack_percent: 2,
            user_percent: 1,
            response_time: Duration::from_millis(1500),
            remote_services: vec!["app-2".into(), "app-0".into()],
        }
    }

    #[test]
    fn payload_uses_duration_strings() {
        let json = config().to_json().unwrap();
        assert!(json.contains(r#""response_time":"1s 500ms""#), "{json}");

        assert_eq!(WorkloadConfig::from_json(&json).unwrap(), config());
    }

    #[test]
    fn remote_services_default_to_empty() {
        let json = r#"{"api_count":1,"rps":1,"pii_percent":1,"attack_percent":1,
            "user_percent":1,"response_time":"2s"}"#;
        let config = WorkloadConfig::from_json(json).unwrap();

        assert!(config.remote_services.is_empty());
        assert_eq!(config.response_time, Duration::from_secs(2));
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            WorkloadConfig::from_json("{not json"),
            Err(ConfigError::Malformed(_))
        ));
        assert!(matches!(
            WorkloadConfig::from_json(r#"{"api_count":1}"#),
            Err(ConfigError::Malformed(_))
        ));

        let mut over = config();
        over.user_percent = 96;
        assert!(matches!(
            WorkloadConfig::from_json(&over.to_json().unwrap()),
            Err(ConfigError::Invalid(_))
        ));

        let mut idle = config();
        idle.rps = 0;
        assert!(matches!(
            WorkloadConfig::from_json(&idle.to_json().unwrap()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_overflowing_percentages() {
        let json = format!(
            r#"{{"api_count":1,"rps":1,"pii_percent":{},"attack_percent":1,
            "user_percent":1,"response_time":"2s"}}"#,
            usize::MAX
        );
        assert!(matches!(
            WorkloadConfig::from_json(&json),
            Err(ConfigError::Invalid(_))
        ));

        let mut huge = config();
        huge.attack_percent = usize::MAX;
        assert_eq!(huge.categorized_percent(), None);
        assert_eq!(config().categorized_percent(), Some(6));
    }

    #[test]
    fn swaps_remote_services() {
        let retargeted = config().with_remote_services(vec!["app-9".into()]);
        assert_eq!(retargeted.remote_services, vec!["app-9"]);
        assert_eq!(retargeted.rps, 5);
    }
}
