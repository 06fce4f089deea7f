//! Logging - tracing subscriber for the bridge and its CLI

use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_JSON_ENV: &str = "WALLET_BRIDGE_LOG_JSON";

/// Install the global subscriber. Filter from `RUST_LOG` (default `info`),
/// JSON lines when `WALLET_BRIDGE_LOG_JSON=1`, always to stderr. Safe to
/// call more than once; later calls are no-ops.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json_requested() {
        let _ = builder.json().with_current_span(false).try_init();
    } else {
        let _ = builder.pretty().try_init();
    }
}

fn json_requested() -> bool {
    std::env::var(LOG_JSON_ENV).map(|value| value.trim() == "1").unwrap_or(false)
}
