use crate::logging::LogFormat;

/// DevTools listing endpoint of a locally running browser.
pub const DEFAULT_DISCOVERY_URL: &str = "http://localhost:9222/json";

/// Upper bound on how long a single command may wait, in seconds.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Owned discovery URL used where allocation is required (e.g. serde).
pub fn default_discovery_url() -> String {
    DEFAULT_DISCOVERY_URL.to_owned()
}

/// Default call timeout in seconds.
pub const fn default_call_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

/// Default log filter expression used by the binary.
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binary.
pub fn default_log_format() -> LogFormat {
    LogFormat::default()
}
