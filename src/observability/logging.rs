//! # Structured Logging
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` plus a fmt layer
//! emitting either JSON or human-readable text. `RUST_LOG`, when set, takes
//! precedence over the configured level.

use crate::core::error::{BalancerError, BalancerResult};
use crate::observability::config::{LogConfig, LogFormat};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Build the filter for `config`, preferring `RUST_LOG` when present
pub fn build_filter(config: &LogConfig) -> BalancerResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| BalancerError::config(format!("Invalid log level '{}': {}", config.level, e)))
}

/// Install the global subscriber
///
/// Fails if the level directive is invalid or a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> BalancerResult<()> {
    let filter = build_filter(config)?;

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
    };

    result.map_err(|e| BalancerError::internal(format!("Failed to install log subscriber: {}", e)))
}
