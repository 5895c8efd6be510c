//! Logging initialization.

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber from config.
///
/// Call once at startup. The `RUST_LOG` env var overrides `cfg.level`.
pub fn init_logging(cfg: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
}
