//! Layered configuration for the treadle worker.
//!
//! [`Config`] merges built-in defaults, configuration files, `TREADLE_*`
//! environment variables and command-line flags through `ortho_config`. The
//! resolved values are consumed by the worker as already-validated settings:
//! logging, the ordered middleware list, dispatcher error handling and the
//! session cookie policy.

mod defaults;
mod logging;
mod session;

use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_COOKIE_PATH, DEFAULT_INTERNAL_PREFIX, DEFAULT_LOG_FILTER, DEFAULT_MAX_LOOP,
    DEFAULT_MIDDLEWARES, DEFAULT_SESSION_GC_LIFETIME, DEFAULT_SESSION_NAME, default_log_filter,
    default_log_format, default_max_loop, default_middlewares,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use session::{SameSite, SessionCookiePolicy};

/// Resolved worker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TREADLE")]
pub struct Config {
    /// Tracing filter expression (`EnvFilter` syntax).
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format of structured logs.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Render full diagnostics for failed requests.
    #[ortho_config(default = false)]
    pub debug_mode: bool,
    /// Route dispatch failures through the error handler.
    #[ortho_config(default = false)]
    pub catch_exceptions: bool,
    /// Handler rendering failures when `catch_exceptions` is enabled.
    pub error_handler: Option<String>,
    /// Maximum dispatch attempts (initial plus forwards) per dispatch run.
    #[ortho_config(default = defaults::default_max_loop())]
    pub max_loop: usize,
    /// Handler names starting with this prefix are not routable.
    #[ortho_config(default = defaults::default_internal_prefix())]
    pub internal_prefix: String,
    /// Ordered middleware names wrapped around the dispatcher.
    #[ortho_config(default = defaults::default_middlewares(), merge_strategy = "replace")]
    pub middlewares: Vec<String>,
    /// Session cookie name.
    #[ortho_config(default = defaults::default_session_name())]
    pub session_name: String,
    /// Cookie path for session and application cookies.
    #[ortho_config(default = defaults::default_cookie_path())]
    pub session_cookie_path: String,
    /// Cookie domain; unset leaves the attribute out.
    pub session_cookie_domain: Option<String>,
    /// Mark cookies `Secure`.
    #[ortho_config(default = false)]
    pub session_cookie_secure: bool,
    /// `SameSite` attribute of the session cookie.
    #[ortho_config(default = defaults::default_same_site())]
    pub session_same_site: SameSite,
    /// Session cookie lifetime in seconds; zero keeps it for the browser session.
    #[ortho_config(default = 0)]
    pub session_lifetime_secs: u64,
    /// Lifetime of stored session data in seconds.
    #[ortho_config(default = defaults::default_session_gc_lifetime_secs())]
    pub session_gc_lifetime_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
            debug_mode: false,
            catch_exceptions: false,
            error_handler: None,
            max_loop: defaults::default_max_loop(),
            internal_prefix: defaults::default_internal_prefix(),
            middlewares: defaults::default_middlewares(),
            session_name: defaults::default_session_name(),
            session_cookie_path: defaults::default_cookie_path(),
            session_cookie_domain: None,
            session_cookie_secure: false,
            session_same_site: defaults::default_same_site(),
            session_lifetime_secs: 0,
            session_gc_lifetime_secs: defaults::default_session_gc_lifetime_secs(),
        }
    }
}

impl Config {
    /// Loads configuration from files, environment and process arguments.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer fails to parse.
    pub fn load_layers() -> Result<Self, Arc<OrthoError>> {
        Self::load()
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Output format of structured logs.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Configured error handler, ignoring blank values.
    #[must_use]
    pub fn error_handler(&self) -> Option<&str> {
        self.error_handler
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Ordered middleware names.
    #[must_use]
    pub fn middlewares(&self) -> &[String] {
        &self.middlewares
    }

    /// Builds the session cookie policy from the flat session fields.
    #[must_use]
    pub fn session_policy(&self) -> SessionCookiePolicy {
        SessionCookiePolicy {
            name: self.session_name.clone(),
            path: self.session_cookie_path.clone(),
            domain: self
                .session_cookie_domain
                .clone()
                .filter(|domain| !domain.is_empty()),
            secure: self.session_cookie_secure,
            same_site: self.session_same_site,
            lifetime: (self.session_lifetime_secs > 0)
                .then(|| Duration::from_secs(self.session_lifetime_secs)),
            gc_lifetime: Duration::from_secs(self.session_gc_lifetime_secs),
        }
    }
}
