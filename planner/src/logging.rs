//! Diagnostic tracing for planner runs.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. Solutions are
//! the only thing written to stdout, so logs never mix with results.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber. Without `RUST_LOG` only warnings show.
///
/// ```bash
/// RUST_LOG=planner=debug planner solve --prompts prompts.json --question "..."
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let layer = fmt::layer().with_writer(std::io::stderr).compact();
    tracing_subscriber::registry().with(filter).with(layer).init();
}
