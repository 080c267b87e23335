//! Logging setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Install the global subscriber. `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.json {
        subscriber
            .with(fmt::layer().json().with_current_span(true).with_thread_ids(true))
            .try_init()
            .map_err(|e| Error::Config(format!("failed to initialize logging: {}", e)))
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .try_init()
            .map_err(|e| Error::Config(format!("failed to initialize logging: {}", e)))
    }
}
