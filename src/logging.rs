// Logging setup: file output only, the window owns the terminal

use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{BoothError, Result};

/// Initializes the logging system (file only, no console output)
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let log_file = std::fs::File::create(&config.file).map_err(BoothError::Io)?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(|e| BoothError::Config(format!("Logging already initialized: {e}")))?;

    Ok(())
}
