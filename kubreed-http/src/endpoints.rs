//! The incoming half of a workload: simulated API endpoints.
//!
//! Every API index `k` in `0..api_count` is served at `/api<k>.txt`. A request
//! waits for a uniformly random time below the configured response time and is
//! then answered with `OK`. Handlers keep no state between requests.

use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Router, routing};
use rand::Rng;

use crate::state::ServiceState;

/// Body of every simulated API response.
pub const RESPONSE_BODY: &str = "OK";

/// Creates a router with all API endpoints and the health check.
pub fn routes(api_count: usize) -> Router<ServiceState> {
    let mut router = Router::new().route("/health", routing::get(health));
    for api in 0..api_count {
        router = router.route(&format!("/api{api}.txt"), routing::get(simulate));
    }
    router
}

async fn health() -> impl IntoResponse {
    "OK"
}

async fn simulate(State(state): State<ServiceState>) -> impl IntoResponse {
    let delay = response_delay(&mut rand::rng(), state.workload.response_time);
    tokio::time::sleep(delay).await;
    RESPONSE_BODY
}

/// Draws a delay in `[0, bound)`.
pub fn response_delay<R>(rng: &mut R, bound: Duration) -> Duration
where
    R: Rng + ?Sized,
{
    if bound.is_zero() {
        return Duration::ZERO;
    }
    rng.random_range(Duration::ZERO..bound)
}
