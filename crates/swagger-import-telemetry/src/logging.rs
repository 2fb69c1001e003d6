//! Structured logging with JSON or pretty output.

use crate::{LogFormat, TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the logging subsystem.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => init_json_logging(filter),
        LogFormat::Pretty => init_pretty_logging(filter, config.ansi),
    }
}

fn init_json_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let json_layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_current_span(true)
        .with_span_list(false)
        .flatten_event(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

fn init_pretty_logging(filter: EnvFilter, ansi: bool) -> Result<(), TelemetryError> {
    let pretty_layer = fmt::layer()
        .compact()
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(pretty_layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Standard log event names, emitted as the `event` field.
pub mod events {
    /// A target's pipeline has started.
    pub const PIPELINE_STARTED: &str = "pipeline_started";

    /// Credentials were resolved for a target.
    pub const CREDENTIALS_RESOLVED: &str = "credentials_resolved";

    /// Temporary credentials were obtained through STS AssumeRole.
    pub const ROLE_ASSUMED: &str = "role_assumed";

    /// The API description payload was loaded.
    pub const DESCRIPTION_LOADED: &str = "description_loaded";

    /// A new REST API was imported.
    pub const API_IMPORTED: &str = "api_imported";

    /// An existing REST API was overwritten or merged.
    pub const API_UPDATED: &str = "api_updated";

    /// A deployment was created against a stage.
    pub const DEPLOYMENT_CREATED: &str = "deployment_created";

    /// No deployment was configured for the target.
    pub const DEPLOYMENT_SKIPPED: &str = "deployment_skipped";

    /// A target's pipeline reached `Done`.
    pub const PIPELINE_COMPLETED: &str = "pipeline_completed";

    /// A target's pipeline stopped in `Failed`.
    pub const PIPELINE_FAILED: &str = "pipeline_failed";
}

/// Helper macros for structured logging with standard fields.
///
/// These wrap the tracing macros to keep event naming consistent.
#[macro_export]
macro_rules! log_pipeline_started {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::PIPELINE_STARTED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_credentials_resolved {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::CREDENTIALS_RESOLVED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_role_assumed {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::ROLE_ASSUMED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_description_loaded {
    ($($field:tt)*) => {
        tracing::debug!(
            event = $crate::logging::events::DESCRIPTION_LOADED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_api_imported {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::API_IMPORTED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_api_updated {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::API_UPDATED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_deployment_created {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::DEPLOYMENT_CREATED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_deployment_skipped {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::DEPLOYMENT_SKIPPED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_pipeline_completed {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::PIPELINE_COMPLETED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_pipeline_failed {
    ($($field:tt)*) => {
        tracing::error!(
            event = $crate::logging::events::PIPELINE_FAILED,
            $($field)*
        )
    };
}
