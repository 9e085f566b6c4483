//! Exposes an in-process workload server for use in integration tests.
//!
//! ```
//! use kubreed_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/api0.txt");
//!    // use the URL in tests...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use kubreed_core::WorkloadConfig;
use kubreed_http::config::Config;
use kubreed_http::state::State;
use kubreed_http::web::App;

/// An in-process workload server for use in integration tests.
///
/// The server only serves the simulated APIs; it does not dispatch any traffic.
/// It listens on a random available port on localhost and stops when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
}

impl TestServer {
    /// Starts a server with two APIs and a short response time.
    pub async fn new() -> Self {
        Self::with_workload(WorkloadConfig {
            api_count: 2,
            rps: 1,
            pii_percent: 1,
            attack_percent: 1,
            user_percent: 1,
            response_time: Duration::from_millis(20),
            remote_services: Vec::new(),
        })
        .await
    }

    /// Starts a server with the given traffic configuration.
    pub async fn with_workload(workload: WorkloadConfig) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let config = Config {
            http_addr: socket,
            ..Default::default()
        };
        let app = App::new(State::new(config, workload));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            app.serve(listener).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// The host and port the server listens on, usable as a remote service name.
    pub fn authority(&self) -> String {
        format!("localhost:{}", self.socket.port())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
