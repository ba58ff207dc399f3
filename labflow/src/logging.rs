//! Diagnostic tracing for the binary.
//!
//! This is operator-facing noise on stderr, filtered by `RUST_LOG`. The record
//! of what actually ran on the compute node is the JSONL call log in
//! [`crate::io::observability`], which does not depend on the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber (`warn` unless `RUST_LOG` says otherwise).
///
/// ```bash
/// RUST_LOG=labflow::graph=debug,labflow=info labflow run "merge reads in /data/raw"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
