use std::sync::Arc;

use kubreed_core::WorkloadConfig;

use crate::config::Config;

/// Shared reference to the workload [state](State).
pub type ServiceState = Arc<State>;

/// Everything the request handlers need.
///
/// Created once during startup and shared with all handlers through
/// `axum::extract::State<ServiceState>`.
#[derive(Debug)]
pub struct State {
    /// The process settings.
    pub config: Config,
    /// The traffic configuration of this workload.
    pub workload: WorkloadConfig,
}

impl State {
    /// Wraps the configurations for sharing.
    pub fn new(config: Config, workload: WorkloadConfig) -> ServiceState {
        Arc::new(Self { config, workload })
    }
}
