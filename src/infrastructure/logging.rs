//! Tracing subscriber initialization.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::domain::models::config::LoggingConfig;

/// Initialize the global tracing subscriber from config.
///
/// `RUST_LOG` overrides the configured level when set. Safe to call once;
/// later calls are ignored.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hivemind={}", config.level)));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.format == "pretty" {
        registry.with(tracing_subscriber::fmt::layer().pretty()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}
