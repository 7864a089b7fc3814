//! Session cookie policy shared by the session lifecycle and the response.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Value of the `SameSite` cookie attribute.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum SameSite {
    /// Cookie is withheld from cross-site subrequests but sent on navigation.
    #[default]
    Lax,
    /// Cookie is only sent in a first-party context.
    Strict,
    /// Cookie is sent in all contexts; browsers require `Secure`.
    None,
}

/// Resolved cookie and storage settings for sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookiePolicy {
    /// Cookie name carrying the session identifier.
    pub name: String,
    /// Cookie `path` attribute.
    pub path: String,
    /// Cookie `domain` attribute; `None` leaves it unset.
    pub domain: Option<String>,
    /// Whether the cookie carries the `Secure` attribute.
    pub secure: bool,
    /// Cookie `SameSite` attribute.
    pub same_site: SameSite,
    /// Cookie lifetime; `None` keeps the cookie until the browser closes.
    pub lifetime: Option<Duration>,
    /// How long stored session data survives without being written.
    pub gc_lifetime: Duration,
}

impl Default for SessionCookiePolicy {
    fn default() -> Self {
        Self {
            name: crate::defaults::default_session_name(),
            path: crate::defaults::default_cookie_path(),
            domain: None,
            secure: false,
            same_site: SameSite::Lax,
            lifetime: None,
            gc_lifetime: crate::defaults::DEFAULT_SESSION_GC_LIFETIME,
        }
    }
}
