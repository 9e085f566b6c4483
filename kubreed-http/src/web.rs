//! The HTTP server of a workload.
//!
//! [`App`] wires the [endpoints](crate::endpoints) with middleware. To listen
//! for incoming connections, use [`server()`], which opens a TCP listener and
//! serves the application until a termination signal arrives.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::ServiceExt;
use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderValue, header};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal::unix::SignalKind;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::endpoints;
use crate::state::ServiceState;

/// The maximum backlog for TCP listen sockets before refusing connections.
const TCP_LISTEN_BACKLOG: u32 = 1024;

/// The value for the `Server` HTTP header.
const SERVER: &str = concat!("kubreed-http/", env!("CARGO_PKG_VERSION"));

/// The workload web application.
#[derive(Debug)]
pub struct App {
    router: axum::Router,
    graceful_shutdown: bool,
}

impl App {
    /// Creates the router serving the workload's APIs.
    pub fn new(state: ServiceState) -> Self {
        let router = endpoints::routes(state.workload.api_count)
            .layer(SetResponseHeaderLayer::overriding(
                header::SERVER,
                HeaderValue::from_static(SERVER),
            ))
            .layer(TraceLayer::new_for_http().make_span_with(make_http_span))
            .with_state(state);

        App {
            router,
            graceful_shutdown: false,
        }
    }

    /// Enables or disables graceful shutdown for the server.
    ///
    /// By default, graceful shutdown is disabled.
    pub fn graceful_shutdown(mut self, enable: bool) -> Self {
        self.graceful_shutdown = enable;
        self
    }

    /// Runs the web server until graceful shutdown is triggered.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let service = ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(
            self.router,
        );

        if self.graceful_shutdown {
            let guard = elegant_departure::get_shutdown_guard();
            axum::serve(listener, service)
                .with_graceful_shutdown(guard.wait_owned())
                .await?;
        } else {
            axum::serve(listener, service).await?;
        }

        Ok(())
    }
}

/// Creates a tracing span for an HTTP request, recording the peer address.
fn make_http_span(request: &Request) -> tracing::Span {
    let span = tracing::debug_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        client_addr = tracing::field::Empty,
    );

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        span.record("client_addr", tracing::field::display(addr));
    }

    span
}

/// Runs the workload HTTP server until termination is requested.
pub async fn server(state: ServiceState) -> Result<()> {
    let listener = listen(state.config.http_addr).context("failed to start TCP listener")?;

    let server_handle = tokio::spawn(async move {
        App::new(state)
            .graceful_shutdown(true)
            .serve(listener)
            .await
    });

    tokio::spawn(async move {
        elegant_departure::get_shutdown_guard().wait().await;
        tracing::info!("Shutting down ...");
    });

    elegant_departure::tokio::depart()
        .on_termination()
        .on_sigint()
        .on_signal(SignalKind::hangup())
        .on_signal(SignalKind::quit())
        .await;

    let server_result = server_handle.await.map_err(From::from).flatten();
    tracing::info!("Shutdown complete");
    server_result
}

fn listen(addr: SocketAddr) -> Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }?;

    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;

    let listener = socket.listen(TCP_LISTEN_BACKLOG)?;
    tracing::info!("HTTP server listening on {addr}");

    Ok(listener)
}
