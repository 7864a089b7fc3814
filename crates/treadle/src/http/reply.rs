//! Finished response handed back to the transport.

use std::borrow::Cow;

use http::StatusCode;
use http::header::{AsHeaderName, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Serialize, Serializer};

use super::Response;
use super::headers::{header_str, serialize_headers};

const INTERNAL_ERROR_BODY: &str = r#"{"error":"Internal server error"}"#;

/// Status, headers and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    /// Status code.
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusCode,
    /// Optional reason phrase.
    pub reason: Option<String>,
    /// Response headers.
    #[serde(serialize_with = "serialize_headers")]
    pub headers: HeaderMap,
    /// Body bytes.
    #[serde(serialize_with = "serialize_body")]
    pub body: Vec<u8>,
}

impl Reply {
    /// Creates an empty reply with the given status.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Snapshot of the shared response with the rendered body.
    ///
    /// Headers are copied as they are, repeated values included.
    #[must_use]
    pub fn from_response(response: &Response, body: Vec<u8>) -> Self {
        Self {
            status: response.status(),
            reason: response.reason().map(str::to_owned),
            headers: response.headers().clone(),
            body,
        }
    }

    /// Fixed reply for requests the transport could not decode.
    #[must_use]
    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST)
            .with_header(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )
            .with_body("Bad Request")
    }

    /// Fixed reply for failures that escaped the middleware chain.
    #[must_use]
    pub fn internal_server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(INTERNAL_ERROR_BODY)
    }

    /// Adds a header value.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header as text.
    #[must_use]
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        header_str(&self.headers, name)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

fn serialize_status<S: Serializer>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u16(status.as_u16())
}

fn serialize_body<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(body))
}
