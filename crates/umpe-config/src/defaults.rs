use std::time::Duration;

use camino::Utf8PathBuf;

use crate::endpoint::HostEndpoint;

/// Address the host listens on when no info file has been published.
pub const DEFAULT_HOST_ADDRESS: &str = "127.0.0.1";

/// Port the host listens on when no info file has been published.
pub const DEFAULT_HOST_PORT: u16 = 61149;

/// Channel name used by the event service.
pub const DEFAULT_CHANNEL: &str = "event";

/// Discovery budget for a request, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 700;

/// Recommended cadence for the timeout sweep, in milliseconds.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 10;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Name of the file the host writes its `address:port` into.
pub const INFO_FILE_NAME: &str = "ChannelService.info";

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default discovery budget applied to requests without an explicit timeout.
#[must_use]
pub const fn default_request_timeout() -> Duration {
    Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)
}

/// Default sweep cadence.
#[must_use]
pub const fn default_sweep_interval() -> Duration {
    Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS)
}

/// Endpoint used when neither an explicit endpoint nor an info file exists.
#[must_use]
pub fn default_host_endpoint() -> HostEndpoint {
    HostEndpoint::new(DEFAULT_HOST_ADDRESS, DEFAULT_HOST_PORT)
}

/// Location the host publishes its info file to, when the platform exposes a
/// local data directory.
#[must_use]
pub fn default_info_file() -> Option<Utf8PathBuf> {
    let base = dirs::data_local_dir()?;
    let mut path = Utf8PathBuf::from_path_buf(base).ok()?;
    path.push("Unity");
    path.push("Editor");
    path.push(INFO_FILE_NAME);
    Some(path)
}
