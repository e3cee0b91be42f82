use tracing_subscriber::EnvFilter;

use crate::config::{ConfigurationError, LoggingConfig};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `logging.level` when set.
pub fn init(config: &LoggingConfig) -> Result<(), ConfigurationError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ConfigurationError::Invalid(format!("logging.level: {}", e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match config.format.as_str() {
        "pretty" => builder.pretty().try_init(),
        _ => builder.json().try_init(),
    };
    installed.map_err(|e| ConfigurationError::Invalid(format!("logging: {}", e)))
}
