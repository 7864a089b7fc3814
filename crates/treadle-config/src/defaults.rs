//! Built-in defaults applied before configuration layers are merged.

use std::time::Duration;

use crate::logging::LogFormat;
use crate::session::SameSite;

/// Default log filter expression used by the worker binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Maximum number of dispatch attempts within one dispatch run.
pub const DEFAULT_MAX_LOOP: usize = 10;

/// Prefix reserving handler names for internal use.
pub const DEFAULT_INTERNAL_PREFIX: &str = "Internal:";

/// Name of the session cookie.
pub const DEFAULT_SESSION_NAME: &str = "TREADLESID";

/// Cookie path used for session and application cookies.
pub const DEFAULT_COOKIE_PATH: &str = "/";

/// Lifetime of stored session data when no explicit value is configured.
pub const DEFAULT_SESSION_GC_LIFETIME: Duration = Duration::from_secs(3 * 60 * 60);

/// Middlewares installed when the configuration does not list any.
pub const DEFAULT_MIDDLEWARES: &[&str] = &["try-catch", "session"];

/// Default log filter expression used by the worker binary.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the worker binary.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default forward-loop bound.
#[must_use]
pub fn default_max_loop() -> usize {
    DEFAULT_MAX_LOOP
}

/// Owned internal handler prefix.
#[must_use]
pub fn default_internal_prefix() -> String {
    DEFAULT_INTERNAL_PREFIX.to_owned()
}

/// Owned session cookie name.
#[must_use]
pub fn default_session_name() -> String {
    DEFAULT_SESSION_NAME.to_owned()
}

/// Owned cookie path.
#[must_use]
pub fn default_cookie_path() -> String {
    DEFAULT_COOKIE_PATH.to_owned()
}

/// Default `SameSite` attribute for the session cookie.
#[must_use]
pub fn default_same_site() -> SameSite {
    SameSite::Lax
}

/// Session garbage-collection lifetime in whole seconds.
#[must_use]
pub fn default_session_gc_lifetime_secs() -> u64 {
    DEFAULT_SESSION_GC_LIFETIME.as_secs()
}

/// Ordered middleware names installed by default.
#[must_use]
pub fn default_middlewares() -> Vec<String> {
    DEFAULT_MIDDLEWARES
        .iter()
        .map(|name| (*name).to_owned())
        .collect()
}
