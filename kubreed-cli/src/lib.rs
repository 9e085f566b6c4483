//! Command line front end of the topology reconciler.
//!
//! `kubreed` either creates new namespaces populated with a mesh of synthetic
//! workloads, or reconciles an existing namespace towards new settings. The
//! generated traffic graphs are recorded in a YAML document per cluster.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
