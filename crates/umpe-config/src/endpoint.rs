use std::fmt;
use std::fs;
use std::num::ParseIntError;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Network location of the host's channel service.
///
/// The host publishes its endpoint as `address:port` text, either on the
/// command line of the embedding process or in an info file next to its
/// other runtime artefacts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HostEndpoint {
    address: String,
    port: u16,
}

impl HostEndpoint {
    /// Builds an endpoint from its parts.
    #[must_use]
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Host address, as published.
    #[must_use]
    pub const fn address(&self) -> &str {
        self.address.as_str()
    }

    /// Host port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// WebSocket URL of a named channel on this host.
    #[must_use]
    pub fn channel_url(&self, channel: &str) -> String {
        format!("ws://{}:{}/{channel}", self.address, self.port)
    }

    /// Reads the endpoint the host wrote into its info file.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::ReadInfoFile`] when the file cannot be read
    /// and a parse error when its content is not `address:port`.
    pub fn from_info_file(path: &Utf8Path) -> Result<Self, EndpointError> {
        let content =
            fs::read_to_string(path.as_std_path()).map_err(|source| EndpointError::ReadInfoFile {
                path: path.to_path_buf(),
                source,
            })?;
        content.trim().parse()
    }
}

impl fmt::Display for HostEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.address, self.port)
    }
}

impl FromStr for HostEndpoint {
    type Err = EndpointError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let Some((address, port)) = input.rsplit_once(':') else {
            return Err(EndpointError::MissingPort(input.to_owned()));
        };
        if address.is_empty() {
            return Err(EndpointError::MissingAddress(input.to_owned()));
        }
        let parsed_port = port
            .parse::<u16>()
            .map_err(|source| EndpointError::InvalidPort {
                input: input.to_owned(),
                source,
            })?;
        Ok(Self::new(address, parsed_port))
    }
}

/// Errors raised while resolving the host endpoint.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// No `:port` suffix was present.
    #[error("missing port in host endpoint '{0}'")]
    MissingPort(String),
    /// Nothing preceded the port separator.
    #[error("missing address in host endpoint '{0}'")]
    MissingAddress(String),
    /// The port was not a valid TCP port number.
    #[error("invalid port in host endpoint '{input}': {source}")]
    InvalidPort {
        /// Text that failed to parse.
        input: String,
        /// Underlying integer parse failure.
        #[source]
        source: ParseIntError,
    },
    /// The host's info file could not be read.
    #[error("failed to read host info file '{path}': {source}")]
    ReadInfoFile {
        /// Location that was read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
