//! Log output shared by the `kubreed` and `kubreed-http` binaries.
//!
//! Logs always go to stderr, so stdout stays free for command output.

use std::{env, io};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Installs the global tracing subscriber, writing to stderr.
///
/// `verbose_crates` are logged at full verbosity unless `RUST_LOG` says otherwise.
pub fn init_tracing(verbose_crates: &[&str]) {
    let rust_log = env::var(EnvFilter::DEFAULT_ENV).ok();
    let (level, filter) = log_filter(rust_log.as_deref(), verbose_crates);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_filter(level),
        )
        .with(filter)
        .init();
}

/// Derives the maximum verbosity and the per-crate filter from `RUST_LOG`.
///
/// A bare level such as `debug` caps the verbosity while `verbose_crates` may
/// log up to that level and everything else stays at `INFO`. Any other value is
/// taken as a filter directive verbatim.
pub fn log_filter(rust_log: Option<&str>, verbose_crates: &[&str]) -> (LevelFilter, EnvFilter) {
    let level = match rust_log {
        None => LevelFilter::INFO,
        Some(value) => match value.parse::<LevelFilter>() {
            Ok(level) => level,
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
    };

    let directives: Vec<String> = std::iter::once("INFO".to_owned())
        .chain(verbose_crates.iter().map(|name| format!("{name}=TRACE")))
        .collect();

    (level, EnvFilter::new(directives.join(",")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRATES: &[&str] = &["kubreed_cli", "kubreed_core"];

    #[test]
    fn bare_level_caps_verbosity() {
        assert_eq!(log_filter(None, CRATES).0, LevelFilter::INFO);
        assert_eq!(log_filter(Some("debug"), CRATES).0, LevelFilter::DEBUG);

        let (_, filter) = log_filter(Some("warn"), CRATES);
        let filter = filter.to_string();
        assert!(filter.contains("kubreed_cli=trace"));
        assert!(filter.contains("kubreed_core=trace"));
        assert!(!filter.contains("tower_http"));
    }

    #[test]
    fn directives_are_used_verbatim() {
        let (level, filter) = log_filter(Some("kubreed_core::reconcile=debug"), CRATES);
        assert_eq!(level, LevelFilter::TRACE);
        assert_eq!(filter.to_string(), "kubreed_core::reconcile=debug");
    }
}
