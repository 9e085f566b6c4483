//! Process settings of the workload server.
//!
//! These settings are independent of the mesh: the traffic configuration is
//! delivered separately as a [`WorkloadConfig`](kubreed_core::WorkloadConfig)
//! in the `KUBREED_CONFIG` environment variable. Settings are loaded with the
//! following precedence (highest to lowest):
//!
//! 1. Environment variables (prefixed with `KH__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! Double underscores denote nested fields, for example
//! `KH__DISPATCH__MAX_IN_FLIGHT=500`.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "KH__";

/// Settings of the traffic dispatcher.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Dispatch {
    /// Upper bound of requests in flight.
    ///
    /// `None` spawns every request as a detached task without any limit.
    ///
    /// # Environment Variable
    ///
    /// `KH__DISPATCH__MAX_IN_FLIGHT`
    pub max_in_flight: Option<usize>,

    /// Length of the interval in which `rps` requests are sent.
    ///
    /// # Default
    ///
    /// `1s`
    ///
    /// # Environment Variable
    ///
    /// `KH__DISPATCH__PAUSE`
    #[serde(with = "humantime_serde")]
    pub pause: Duration,
}

impl Default for Dispatch {
    fn default() -> Self {
        Self {
            max_in_flight: None,
            pause: Duration::from_secs(1),
        }
    }
}

/// Main configuration of the workload server.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server bind address.
    ///
    /// # Default
    ///
    /// `0.0.0.0:80`, the port targeted by the workload's service endpoint.
    ///
    /// # Environment Variable
    ///
    /// `KH__HTTP_ADDR`
    pub http_addr: SocketAddr,

    /// Dispatcher settings.
    pub dispatch: Dispatch,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 80)),
            dispatch: Dispatch::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}
