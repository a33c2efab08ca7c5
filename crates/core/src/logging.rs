//! Structured logging setup
//!
//! Installs a `tracing` subscriber driven by [`LoggingConfig`]. Logs go to
//! stderr so command output on stdout stays clean.

use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app_config::{LogFormat, LoggingConfig};

/// Initialize logging for the process
///
/// `RUST_LOG` takes precedence over the configured level. Returns an error if
/// the filter cannot be parsed; a subscriber installed earlier is left in place.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).pretty())
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).compact().with_target(false))
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global subscriber already installed, keeping it");
    }

    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}
