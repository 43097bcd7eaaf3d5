//! Tracing setup shared by the `verifier` CLI and the API server.
//!
//! Tracing is developer diagnostics on stderr, filtered by `RUST_LOG`. Run
//! records (`io/run_log`) are the product output and are written regardless
//! of the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter for the CLI: quiet unless something goes wrong.
pub const CLI_DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set and parseable; otherwise `default_filter` is
/// used. Output is compact, on stderr.
///
/// ```bash
/// RUST_LOG=verifier=debug verifier run workflow.json
/// ```
pub fn init(default_filter: &str) {
    tracing_subscriber::registry()
        .with(filter(default_filter))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}
