//! Log capture for tests.

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "ERROR,kubreed_core=TRACE,kubreed_http=TRACE,kubreed_cli=TRACE";

/// Routes logs of the kubreed crates to the test runner's output.
///
/// `RUST_LOG` replaces the default filter. Calling this more than once is a
/// no-op, so every test may call it.
///
/// ```
/// kubreed_test::tracing::init();
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
