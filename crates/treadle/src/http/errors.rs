//! Errors raised while building requests and mutating responses.

use thiserror::Error;

/// Errors surfaced by the HTTP primitives.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Response code outside the range permitted by HTTP.
    #[error("bad HTTP response code {code}; expected a value between 100 and 599")]
    InvalidStatus {
        /// Rejected code.
        code: u16,
    },
    /// Request method is not a valid HTTP token.
    #[error("invalid request method '{method}': {source}")]
    InvalidMethod {
        /// Method text as received.
        method: String,
        /// Parser failure.
        #[source]
        source: http::method::InvalidMethod,
    },
    /// Request URI could not be parsed.
    #[error("invalid request URI '{uri}': {source}")]
    InvalidUri {
        /// URI text as received.
        uri: String,
        /// Parser failure.
        #[source]
        source: url::ParseError,
    },
    /// Header name is not a valid HTTP token.
    #[error("invalid header name '{name}': {source}")]
    InvalidHeaderName {
        /// Name as received.
        name: String,
        /// Parser failure.
        #[source]
        source: http::header::InvalidHeaderName,
    },
    /// Header value contains bytes not allowed in a header.
    #[error("invalid value for header '{name}': {source}")]
    InvalidHeaderValue {
        /// Header the value was meant for.
        name: String,
        /// Parser failure.
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    /// The current cycle has no bound request.
    #[error("no request is bound to the current cycle")]
    RequestNotSet,
    /// An HTTP date could not be rendered.
    #[error("failed to format HTTP date: {source}")]
    DateFormat {
        /// Formatter failure.
        #[source]
        source: time::error::Format,
    },
}

impl HttpError {
    /// Creates an invalid URI error.
    pub fn invalid_uri(uri: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidUri {
            uri: uri.into(),
            source,
        }
    }

    /// Creates an invalid method error.
    pub fn invalid_method(method: impl Into<String>, source: http::method::InvalidMethod) -> Self {
        Self::InvalidMethod {
            method: method.into(),
            source,
        }
    }

    /// Creates an invalid header name error.
    pub fn invalid_header_name(
        name: impl Into<String>,
        source: http::header::InvalidHeaderName,
    ) -> Self {
        Self::InvalidHeaderName {
            name: name.into(),
            source,
        }
    }

    /// Creates an invalid header value error.
    pub fn invalid_header_value(
        name: impl Into<String>,
        source: http::header::InvalidHeaderValue,
    ) -> Self {
        Self::InvalidHeaderValue {
            name: name.into(),
            source,
        }
    }
}
