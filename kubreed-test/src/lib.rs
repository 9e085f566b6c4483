//! Shared helpers for the kubreed integration tests.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod server;
pub mod tracing;
