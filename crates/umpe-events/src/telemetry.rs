//! Tracing setup for processes that embed the engine.
//!
//! The engine logs under three targets: `umpe::service` for lifecycle and
//! request flow, `umpe::codec` for frames that fail to decode, and
//! `umpe::dispatch` for handler failures. A bare level in the configured
//! filter (`debug`, `info`, ...) is scoped to those targets and the rest of
//! the process stays at `warn`. Any other filter is handed to
//! [`EnvFilter`] unchanged.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

use umpe_config::{Config, LogFormat};

use crate::dispatch::DISPATCH_TARGET;
use crate::service::{CODEC_TARGET, SERVICE_TARGET};

/// Targets the engine logs under.
pub const ENGINE_TARGETS: [&str; 3] = [SERVICE_TARGET, CODEC_TARGET, DISPATCH_TARGET];

const EMBEDDER_LEVEL: &str = "warn";

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned once telemetry is installed.
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
/// Later calls return a fresh [`TelemetryHandle`] without touching the global
/// state. Engines log through `tracing` whether or not this is called, so
/// processes that bring their own subscriber can skip it.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter and
/// [`TelemetryError::Subscriber`] when another subscriber is already
/// installed globally.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| {
            let subscriber = build_subscriber(config)?;
            tracing::subscriber::set_global_default(subscriber)
                .map_err(TelemetryError::Subscriber)
        })
        .map(|()| TelemetryHandle)
}

/// Expands a bare level into per-target directives for the engine.
fn directives(filter: &str) -> String {
    let trimmed = filter.trim();
    if trimmed.parse::<LevelFilter>().is_err() {
        return trimmed.to_owned();
    }
    let scoped: Vec<String> = ENGINE_TARGETS
        .iter()
        .map(|target| format!("{target}={trimmed}"))
        .collect();
    format!("{EMBEDDER_LEVEL},{}", scoped.join(","))
}

type BoxedSubscriber = Box<dyn Subscriber + Send + Sync>;

fn build_subscriber(config: &Config) -> Result<BoxedSubscriber, TelemetryError> {
    let filter = EnvFilter::try_new(directives(config.log_filter()))
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());

    Ok(match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    })
}
