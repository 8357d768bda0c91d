//! Test-only helpers shared across the workspace: a tracing init function and
//! a handful of known-good wire-format fixtures.

pub mod vectors;

use tracing_subscriber::EnvFilter;

/// Initializes a tracing subscriber for test output.
///
/// Reads `RUST_LOG` for filter directives, falling back to showing
/// everything at `debug` and above. Safe to call from multiple tests in the
/// same process; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
