//! Structured telemetry initialisation shared by the daemon and the CLI.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use warden_config::{LogFormat, Settings};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on first use.
///
/// `default_filter` applies unless debug logging was requested, in which
/// case everything at `debug` and above is emitted. Later calls return a
/// handle without touching the global state.
///
/// # Examples
///
/// ```rust
/// use warden_config::{Config, Settings, DEFAULT_DAEMON_LOG_FILTER};
/// use wardend::telemetry;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = Settings::from_config(&Config::default())?;
/// telemetry::initialise(&settings, DEFAULT_DAEMON_LOG_FILTER)?;
/// telemetry::initialise(&settings, DEFAULT_DAEMON_LOG_FILTER)?;
/// # Ok(())
/// # }
/// ```
pub fn initialise(
    settings: &Settings,
    default_filter: &'static str,
) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| {
            install_subscriber(settings.log_filter(default_filter), settings.log_format())
        })
        .map(|()| TelemetryHandle)
}

fn install_subscriber(filter: &str, format: LogFormat) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_new(filter).map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
