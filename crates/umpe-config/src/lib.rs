//! Shared configuration for processes embedding the event service.
//!
//! Settings are layered the same way for every peer: built-in defaults,
//! then `UMPE_*` environment variables, then explicit arguments handed to
//! [`Config::load_from_iter`] by the embedding process. The host endpoint
//! has one more fallback: when neither an explicit endpoint nor an info file
//! path is configured, the info file the host publishes in the local data
//! directory is consulted before falling back to the built-in address.

mod defaults;
mod endpoint;
mod logging;

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_CHANNEL, DEFAULT_HOST_ADDRESS, DEFAULT_HOST_PORT, DEFAULT_LOG_FILTER,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SWEEP_INTERVAL_MS, INFO_FILE_NAME, default_host_endpoint,
    default_info_file, default_log_filter, default_log_format, default_request_timeout,
    default_sweep_interval,
};
pub use endpoint::{EndpointError, HostEndpoint};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration for an event-service peer.
#[derive(Debug, Clone, Parser, Serialize, Deserialize, PartialEq, Eq)]
#[command(name = "umpe", about = "Event-service peer configuration")]
pub struct Config {
    /// Host endpoint as `address:port`; takes precedence over the info file.
    #[arg(long, env = "UMPE_HOST_ENDPOINT", value_name = "ADDRESS:PORT")]
    pub host_endpoint: Option<HostEndpoint>,

    /// Info file the host publishes its endpoint into.
    #[arg(long, env = "UMPE_INFO_FILE", value_name = "PATH")]
    pub info_file: Option<Utf8PathBuf>,

    /// Channel the event service is multiplexed on.
    #[arg(long, env = "UMPE_CHANNEL", default_value = DEFAULT_CHANNEL)]
    pub channel: String,

    /// Discovery budget for requests without an explicit timeout.
    #[arg(
        long,
        env = "UMPE_REQUEST_TIMEOUT_MS",
        value_name = "MILLISECONDS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_MS
    )]
    pub request_timeout_ms: u64,

    /// Cadence at which the embedding loop should run the timeout sweep.
    #[arg(
        long,
        env = "UMPE_SWEEP_INTERVAL_MS",
        value_name = "MILLISECONDS",
        default_value_t = DEFAULT_SWEEP_INTERVAL_MS
    )]
    pub sweep_interval_ms: u64,

    /// `tracing` filter expression.
    #[arg(long, env = "UMPE_LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,

    /// Log output format.
    #[arg(long, env = "UMPE_LOG_FORMAT", default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host_endpoint: None,
            info_file: None,
            channel: DEFAULT_CHANNEL.to_owned(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads the configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// See [`Config::load_from_iter`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads the configuration from an explicit argument list.
    ///
    /// The first item is treated as the program name, as with
    /// `std::env::args_os`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Arguments`] when an argument or environment
    /// variable cannot be parsed, and [`ConfigError::ZeroDuration`] when a
    /// timing setting is zero.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config =
            Self::try_parse_from(args).map_err(|error| ConfigError::Arguments(Box::new(error)))?;
        config.validate()?;
        Ok(config)
    }

    const fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                setting: "request_timeout_ms",
            });
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                setting: "sweep_interval_ms",
            });
        }
        Ok(())
    }

    /// Discovery budget applied to requests without an explicit timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Cadence at which the timeout sweep should run.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Channel the event service is multiplexed on.
    #[must_use]
    pub const fn channel(&self) -> &str {
        self.channel.as_str()
    }

    /// Filter expression handed to the telemetry subscriber.
    #[must_use]
    pub const fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Resolves the host endpoint.
    ///
    /// An explicit endpoint wins, then an explicitly configured info file,
    /// then the host's default info file when it exists, then the built-in
    /// default endpoint.
    ///
    /// # Errors
    ///
    /// Returns an [`EndpointError`] when a configured or discovered info file
    /// cannot be read or parsed.
    pub fn resolve_host_endpoint(&self) -> Result<HostEndpoint, EndpointError> {
        if let Some(endpoint) = &self.host_endpoint {
            return Ok(endpoint.clone());
        }
        if let Some(path) = &self.info_file {
            return HostEndpoint::from_info_file(path);
        }
        match default_info_file() {
            Some(path) if path.is_file() => HostEndpoint::from_info_file(&path),
            _ => Ok(default_host_endpoint()),
        }
    }
}

/// Errors raised while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An argument or environment variable was rejected.
    #[error("invalid configuration: {0}")]
    Arguments(#[source] Box<clap::Error>),
    /// A timing setting was zero.
    #[error("configuration setting '{setting}' must be greater than zero")]
    ZeroDuration {
        /// Name of the offending setting.
        setting: &'static str,
    },
}
