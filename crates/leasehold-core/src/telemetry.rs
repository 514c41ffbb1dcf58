use tracing_subscriber::EnvFilter;

use crate::broker::TelemetryConfig;

/// Initialize the tracing subscriber for structured logging.
///
/// - Debug builds: pretty-printed human-readable output
/// - Release builds: JSON-formatted output for log aggregation
///
/// `config.json` overrides the build default. The filter comes from
/// `RUST_LOG` when set, otherwise from `config.log_filter`.
pub fn init_tracing(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json.unwrap_or(!cfg!(debug_assertions)) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
