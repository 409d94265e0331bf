use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Install the global subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_log = tracing_subscriber::fmt::layer().compact().with_target(false);

    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_log)
        .try_init();
}
