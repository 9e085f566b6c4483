//! The outgoing half of a workload: rate-limited requests to its downstream peers.
//!
//! A [`Schedule`] walks every remote service and, for each, every API index in
//! round-robin order. After `rps` requests it yields a [`Tick::Pause`] and
//! advances the payload cycle position, so exactly `rps` requests leave per
//! pause interval no matter how many destinations there are.
//!
//! The [`Dispatcher`] turns requests into detached tasks. With
//! [`ConcurrencyPolicy::Detached`] nothing ever waits for them: a hung peer does
//! not slow down the schedule, and with no backpressure the number of pending
//! requests can grow without bound. [`ConcurrencyPolicy::Bounded`] caps the
//! number of requests in flight instead, stalling the schedule while the cap is
//! reached.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kubreed_core::WorkloadConfig;
use tokio::sync::Semaphore;

use crate::payload::{CYCLE, TrafficMix};

/// A single outgoing request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    /// Host name of the downstream service.
    pub service: String,
    /// Index of the API on the downstream service.
    pub api: usize,
    /// Query string attached to the request.
    pub payload: Option<&'static str>,
}

impl Target {
    /// The URL requested from the downstream service.
    pub fn url(&self) -> String {
        match self.payload {
            Some(payload) => format!("http://{}/api{}.txt?{payload}", self.service, self.api),
            None => format!("http://{}/api{}.txt", self.service, self.api),
        }
    }
}

/// A step of the [`Schedule`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Issue a request.
    Request(Target),
    /// The rate limit is reached; wait for one interval.
    Pause,
}

/// The infinite sequence of requests and pauses of a workload.
#[derive(Clone, Debug)]
pub struct Schedule {
    services: Vec<String>,
    api_count: usize,
    rps: usize,
    mix: TrafficMix,
    /// Requests issued since the last pause.
    dispatched: usize,
    /// Position in the payload cycle, in `0..CYCLE`.
    position: usize,
    /// Index into `services × 0..api_count`.
    cursor: usize,
    pause_pending: bool,
}

impl Schedule {
    /// Creates the schedule for a workload configuration.
    pub fn new(config: &WorkloadConfig) -> Self {
        Self {
            services: config.remote_services.clone(),
            api_count: config.api_count,
            rps: config.rps.max(1),
            mix: TrafficMix::from_config(config),
            dispatched: 0,
            position: 0,
            cursor: 0,
            pause_pending: false,
        }
    }

    /// Position in the payload cycle.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Requests issued since the last pause.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    fn targets(&self) -> usize {
        self.services.len() * self.api_count
    }
}

impl Iterator for Schedule {
    type Item = Tick;

    /// Returns the next step, or `None` if there is nothing to send to.
    fn next(&mut self) -> Option<Tick> {
        let targets = self.targets();
        if targets == 0 {
            return None;
        }

        if self.pause_pending {
            self.pause_pending = false;
            return Some(Tick::Pause);
        }

        let target = Target {
            service: self.services[self.cursor / self.api_count].clone(),
            api: self.cursor % self.api_count,
            payload: self.mix.payload(self.position),
        };
        self.cursor = (self.cursor + 1) % targets;

        self.dispatched += 1;
        if self.dispatched == self.rps {
            self.dispatched = 0;
            self.position = (self.position + 1) % CYCLE;
            self.pause_pending = true;
        }

        Some(Tick::Request(target))
    }
}

/// Sends requests to downstream services.
#[async_trait::async_trait]
pub trait Transport: fmt::Debug + Send + Sync + 'static {
    /// Issues a `GET` request and returns the response status.
    async fn get(&self, url: &str) -> anyhow::Result<u16>;
}

/// A [`Transport`] using a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with a fresh connection pool.
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("kubreed-http/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> anyhow::Result<u16> {
        let response = self.client.get(url).send().await?;
        Ok(response.status().as_u16())
    }
}

/// How requests are handed off to the runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    /// Every request is a detached task: no join, no cancellation, no backpressure.
    #[default]
    Detached,
    /// At most this many requests are in flight; the schedule waits for a free slot.
    Bounded(usize),
}

impl ConcurrencyPolicy {
    /// `Bounded` if a limit is given, otherwise `Detached`.
    pub fn from_limit(limit: Option<usize>) -> Self {
        match limit {
            Some(limit) => Self::Bounded(limit.max(1)),
            None => Self::Detached,
        }
    }
}

/// Runs the [`Schedule`] of a workload for the lifetime of the process.
#[derive(Debug)]
pub struct Dispatcher {
    schedule: Schedule,
    transport: Arc<dyn Transport>,
    policy: ConcurrencyPolicy,
    pause: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher pausing one second after every `rps` requests.
    pub fn new(config: &WorkloadConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            schedule: Schedule::new(config),
            transport,
            policy: ConcurrencyPolicy::Detached,
            pause: Duration::from_secs(1),
        }
    }

    /// Sets how requests are spawned.
    pub fn policy(mut self, policy: ConcurrencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the length of the rate-limit interval.
    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Dispatches requests forever.
    ///
    /// A workload without remote services has nothing to send and idles instead.
    pub async fn run(self) {
        let Self {
            schedule,
            transport,
            policy,
            pause,
        } = self;

        let limiter = match policy {
            ConcurrencyPolicy::Detached => None,
            ConcurrencyPolicy::Bounded(limit) => Some(Arc::new(Semaphore::new(limit))),
        };

        tracing::info!(?policy, "starting dispatcher");
        for tick in schedule {
            let target = match tick {
                Tick::Request(target) => target,
                Tick::Pause => {
                    tokio::time::sleep(pause).await;
                    tracing::trace!("rate limit interval elapsed");
                    continue;
                }
            };

            let permit = match &limiter {
                Some(limiter) => match Arc::clone(limiter).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => break,
                },
                None => None,
            };

            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                let url = target.url();
                match transport.get(&url).await {
                    Ok(status) => tracing::debug!(%url, status, "request completed"),
                    Err(err) => tracing::warn!(%url, error = %err, "request failed"),
                }
                drop(permit);
            });
        }

        tracing::warn!("no remote services configured, not sending any traffic");
        std::future::pending::<()>().await;
    }
}
