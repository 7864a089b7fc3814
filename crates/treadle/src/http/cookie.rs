//! `Set-Cookie` rendering.

use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use treadle_config::{SameSite, SessionCookiePolicy};

use super::HttpError;

const COOKIE_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// When a cookie stops being sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// No `Expires` attribute; the cookie lives until the browser closes.
    #[default]
    Session,
    /// Expires at an absolute instant.
    At(OffsetDateTime),
    /// Expires after the given duration from now.
    In(Duration),
    /// Already expired; instructs the client to delete the cookie.
    Expired,
}

/// A cookie to be written through [`super::Response::set_cookie`].
///
/// Unset attributes fall back to the response's [`CookieDefaults`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    expiry: Expiry,
    path: Option<String>,
    domain: Option<String>,
    secure: Option<bool>,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl Cookie {
    /// Creates an HTTP-only session cookie.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            expiry: Expiry::Session,
            path: None,
            domain: None,
            secure: None,
            http_only: true,
            same_site: None,
        }
    }

    /// Sets the expiry.
    #[must_use]
    pub fn expires(mut self, expiry: Expiry) -> Self {
        self.expiry = expiry;
        self
    }

    /// Overrides the default path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Overrides the default domain.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Overrides the default `Secure` flag.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    /// Sets the `HttpOnly` flag (enabled by default).
    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Sets the `SameSite` attribute (defaults to `Lax`).
    #[must_use]
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unencoded cookie value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Renders the `Set-Cookie` header value relative to `now`.
    pub(crate) fn render(
        &self,
        defaults: &CookieDefaults,
        now: OffsetDateTime,
    ) -> Result<String, HttpError> {
        let path = match (&self.path, &self.domain) {
            (Some(path), _) => path.as_str(),
            (None, Some(_)) => "/",
            (None, None) => defaults.path.as_str(),
        };
        let mut header = format!(
            "{}={}; path={}; SameSite={}",
            self.name,
            utf8_percent_encode(&self.value, COOKIE_VALUE),
            path,
            self.same_site.unwrap_or_default(),
        );

        let expires_at = match self.expiry {
            Expiry::Session => None,
            Expiry::At(instant) => Some(instant),
            Expiry::In(duration) => Some(now + duration),
            Expiry::Expired => Some(OffsetDateTime::UNIX_EPOCH),
        };
        if let Some(instant) = expires_at {
            header.push_str("; Expires=");
            header.push_str(&format_http_date(instant)?);
        }

        let domain = self.domain.as_deref().or(defaults.domain.as_deref());
        if let Some(domain) = domain.filter(|domain| !domain.is_empty()) {
            header.push_str("; domain=");
            header.push_str(domain);
        }
        if self.secure.unwrap_or(defaults.secure) {
            header.push_str("; secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        Ok(header)
    }
}

/// Cookie attributes applied when a cookie does not set its own.
///
/// These are configuration and survive [`super::Response::cleanup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieDefaults {
    /// Default `path` attribute.
    pub path: String,
    /// Default `domain` attribute.
    pub domain: Option<String>,
    /// Default `Secure` flag.
    pub secure: bool,
}

impl Default for CookieDefaults {
    fn default() -> Self {
        Self {
            path: treadle_config::DEFAULT_COOKIE_PATH.to_owned(),
            domain: None,
            secure: false,
        }
    }
}

impl From<&SessionCookiePolicy> for CookieDefaults {
    fn from(policy: &SessionCookiePolicy) -> Self {
        Self {
            path: policy.path.clone(),
            domain: policy.domain.clone(),
            secure: policy.secure,
        }
    }
}

/// Formats an instant as an RFC 7231 HTTP date (`Mon, 23 Jan 1978 10:00:00 GMT`).
///
/// # Errors
///
/// Returns [`HttpError::DateFormat`] when the instant cannot be rendered.
pub fn format_http_date(instant: OffsetDateTime) -> Result<String, HttpError> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    instant
        .to_offset(UtcOffset::UTC)
        .format(&format)
        .map_err(|source| HttpError::DateFormat { source })
}
