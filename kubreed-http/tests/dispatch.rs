//! Timing tests for the traffic dispatcher, run on a paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kubreed_core::WorkloadConfig;
use kubreed_http::dispatch::{ConcurrencyPolicy, Dispatcher, Transport};

/// Records every requested URL, optionally never answering.
#[derive(Debug, Default)]
struct RecordingTransport {
    urls: Mutex<Vec<String>>,
    hang: bool,
}

impl RecordingTransport {
    fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn get(&self, url: &str) -> anyhow::Result<u16> {
        self.urls.lock().unwrap().push(url.to_owned());
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(200)
    }
}

fn workload(rps: usize, services: &[&str]) -> WorkloadConfig {
    WorkloadConfig {
        api_count: 1,
        rps,
        pii_percent: 1,
        attack_percent: 1,
        user_percent: 1,
        response_time: Duration::from_secs(1),
        remote_services: services.iter().map(|s| s.to_string()).collect(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_sends_rps_requests_per_interval() {
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = Dispatcher::new(&workload(2, &["app-1", "app-2"]), transport.clone());
    let handle = tokio::spawn(dispatcher.run());

    tokio::time::sleep(Duration::from_millis(2500)).await;
    handle.abort();

    let urls = transport.urls();
    assert_eq!(urls.len(), 6);
    assert_eq!(
        &urls[..4],
        [
            "http://app-1/api0.txt?cc=5555555555554444",
            "http://app-2/api0.txt?cc=5555555555554444",
            "http://app-1/api0.txt?d=${jndi:ldap://127.0.0.1/a}",
            "http://app-2/api0.txt?d=${jndi:ldap://127.0.0.1/a}",
        ]
    );
    assert_eq!(urls[4], "http://app-1/api0.txt?username=test1");
}

#[tokio::test(start_paused = true)]
async fn test_configured_pause_sets_interval() {
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = Dispatcher::new(&workload(1, &["app-0"]), transport.clone())
        .pause(Duration::from_millis(100));
    let handle = tokio::spawn(dispatcher.run());

    tokio::time::sleep(Duration::from_millis(950)).await;
    handle.abort();

    assert_eq!(transport.urls().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_detached_requests_do_not_block() {
    let transport = Arc::new(RecordingTransport {
        hang: true,
        ..Default::default()
    });
    let dispatcher = Dispatcher::new(&workload(5, &["app-1"]), transport.clone());
    let handle = tokio::spawn(dispatcher.run());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    handle.abort();

    assert_eq!(transport.urls().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_policy_caps_requests_in_flight() {
    let transport = Arc::new(RecordingTransport {
        hang: true,
        ..Default::default()
    });
    let dispatcher = Dispatcher::new(&workload(5, &["app-1"]), transport.clone())
        .policy(ConcurrencyPolicy::Bounded(3));
    let handle = tokio::spawn(dispatcher.run());

    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.abort();

    assert_eq!(transport.urls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_idles_without_remote_services() {
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = Dispatcher::new(&workload(5, &[]), transport.clone());
    let handle = tokio::spawn(dispatcher.run());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!handle.is_finished());
    handle.abort();

    assert!(transport.urls().is_empty());
}
