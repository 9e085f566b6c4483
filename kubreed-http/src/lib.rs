//! A single workload of the synthetic mesh.
//!
//! The process serves `api_count` simulated APIs (see [`endpoints`]) and at the
//! same time sends rate-limited traffic to its downstream peers (see
//! [`dispatch`]). Its traffic settings arrive as a
//! [`WorkloadConfig`](kubreed_core::WorkloadConfig) in the environment.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod endpoints;
pub mod healthcheck;
pub mod payload;
pub mod state;
pub mod web;
