//! Logging infrastructure for swagger-import.
//!
//! Installs a `tracing` subscriber (JSON or pretty) and defines the standard
//! event names emitted while a deployment pipeline runs.
//!
//! # Usage
//!
//! ```ignore
//! use swagger_import_telemetry::{LogFormat, TelemetryConfig};
//!
//! let config = TelemetryConfig::new()
//!     .with_log_level("debug")
//!     .with_log_format(LogFormat::Pretty);
//! swagger_import_telemetry::init(&config)?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::events;

use thiserror::Error;

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}

/// Initialize logging for the process.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    logging::init_logging(config)?;
    tracing::debug!(
        binary = config.binary,
        format = config.log_format.as_str(),
        "logging initialized"
    );
    Ok(())
}
