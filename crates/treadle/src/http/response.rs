//! Mutable response state shared across a request cycle.

use std::time::Duration;

use http::header::{
    AsHeaderName, CACHE_CONTROL, CONTENT_TYPE, EXPIRES, HeaderMap, HeaderName, HeaderValue,
    LOCATION, PRAGMA, SET_COOKIE,
};
use http::StatusCode;
use time::OffsetDateTime;

use super::{Cookie, CookieDefaults, Expiry, HttpError, format_http_date, header_str, header_value};

const NO_CACHE_EXPIRES: &str = "Mon, 23 Jan 1978 10:00:00 GMT";
const NO_CACHE_CONTROL: &str = "s-maxage=0, max-age=0, must-revalidate";

/// Status, reason and headers accumulated while a request is handled.
///
/// The worker owns one instance for its whole lifetime and resets it with
/// [`Response::cleanup`] at the start of every cycle.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap,
    sent: bool,
    cookie_defaults: CookieDefaults,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(CookieDefaults::default())
    }
}

impl Response {
    /// Creates a pristine response with the given cookie defaults.
    #[must_use]
    pub fn new(cookie_defaults: CookieDefaults) -> Self {
        Self {
            status: StatusCode::OK,
            reason: None,
            headers: HeaderMap::new(),
            sent: false,
            cookie_defaults,
        }
    }

    /// Resets code, reason, headers and the sent flag. Cookie defaults stay.
    pub fn cleanup(&mut self) {
        self.status = StatusCode::OK;
        self.reason = None;
        self.headers.clear();
        self.sent = false;
    }

    /// Sets the status code and reason phrase.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidStatus`] for codes outside `100..=599`.
    pub fn set_code(&mut self, code: u16, reason: Option<&str>) -> Result<&mut Self, HttpError> {
        let status = StatusCode::from_u16(code)
            .ok()
            .filter(|_| code <= 599)
            .ok_or(HttpError::InvalidStatus { code })?;
        Ok(self.set_status(status, reason))
    }

    /// Sets an already validated status and reason phrase.
    pub fn set_status(&mut self, status: StatusCode, reason: Option<&str>) -> &mut Self {
        self.status = status;
        self.reason = reason.map(str::to_owned);
        self
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Current status code as a number.
    #[must_use]
    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Current reason phrase.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Replaces every value of a header.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header value, keeping earlier ones.
    pub fn add_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.append(name, value);
        self
    }

    /// Removes a header.
    pub fn delete_header<K: AsHeaderName>(&mut self, name: K) -> &mut Self {
        self.headers.remove(name);
        self
    }

    /// First value of a header as text.
    #[must_use]
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        header_str(&self.headers, name)
    }

    /// All headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Sets `Content-Type`, optionally with a charset.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidHeaderValue`] when the media type or
    /// charset contains bytes not allowed in a header.
    pub fn set_content_type(
        &mut self,
        media_type: &str,
        charset: Option<&str>,
    ) -> Result<&mut Self, HttpError> {
        let value = match charset {
            Some(charset) => format!("{media_type}; charset={charset}"),
            None => media_type.to_owned(),
        };
        let value = header_value(&CONTENT_TYPE, &value)?;
        Ok(self.set_header(CONTENT_TYPE, value))
    }

    /// Sets the redirect status and `Location`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidHeaderValue`] when `url` cannot be sent as
    /// a header.
    pub fn redirect(&mut self, url: &str, status: StatusCode) -> Result<&mut Self, HttpError> {
        let location = header_value(&LOCATION, url)?;
        self.set_status(status, None);
        Ok(self.set_header(LOCATION, location))
    }

    /// Sets caching headers.
    ///
    /// `None` disables caching entirely; otherwise the response may be cached
    /// for `expire`. Any `Pragma` header is removed.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::DateFormat`] when the expiry date cannot be rendered.
    pub fn set_expiration(&mut self, expire: Option<Duration>) -> Result<&mut Self, HttpError> {
        self.delete_header(PRAGMA);
        let Some(expire) = expire.filter(|expire| !expire.is_zero()) else {
            self.set_header(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE_CONTROL));
            return Ok(self.set_header(EXPIRES, HeaderValue::from_static(NO_CACHE_EXPIRES)));
        };

        let expires = format_http_date(OffsetDateTime::now_utc() + expire)?;
        let cache_control = header_value(&CACHE_CONTROL, &format!("max-age={}", expire.as_secs()))?;
        let expires = header_value(&EXPIRES, &expires)?;
        self.set_header(CACHE_CONTROL, cache_control);
        Ok(self.set_header(EXPIRES, expires))
    }

    /// Reports whether the response has been handed over for sending.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Marks the response as handed over.
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }

    /// Cookie attributes applied to cookies that leave them unset.
    #[must_use]
    pub fn cookie_defaults(&self) -> &CookieDefaults {
        &self.cookie_defaults
    }

    /// Replaces the cookie defaults.
    pub fn set_cookie_defaults(&mut self, defaults: CookieDefaults) {
        self.cookie_defaults = defaults;
    }

    /// Appends a `Set-Cookie` header; earlier cookies of the same name stay.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::DateFormat`] when the expiry date cannot be
    /// rendered and [`HttpError::InvalidHeaderValue`] when the rendered cookie
    /// is not a valid header value.
    pub fn set_cookie(&mut self, cookie: &Cookie) -> Result<&mut Self, HttpError> {
        let rendered = cookie.render(&self.cookie_defaults, OffsetDateTime::now_utc())?;
        let value = header_value(&SET_COOKIE, &rendered)?;
        Ok(self.add_header(SET_COOKIE, value))
    }

    /// Instructs the client to drop a cookie.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::DateFormat`] when the expiry date cannot be rendered.
    pub fn delete_cookie(
        &mut self,
        name: &str,
        path: Option<&str>,
        domain: Option<&str>,
        secure: Option<bool>,
    ) -> Result<&mut Self, HttpError> {
        let mut cookie = Cookie::new(name, "").expires(Expiry::Expired);
        if let Some(path) = path {
            cookie = cookie.path(path);
        }
        if let Some(domain) = domain {
            cookie = cookie.domain(domain);
        }
        if let Some(secure) = secure {
            cookie = cookie.secure(secure);
        }
        self.set_cookie(&cookie)
    }
}
