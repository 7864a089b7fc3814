//! Error types for transport operations.

use std::io;

use thiserror::Error;

use crate::http::HttpError;

/// Fatal transport failures; the worker stops when one occurs.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reading from the input failed.
    #[error("failed to read request: {source}")]
    Read {
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The reply could not be serialized.
    #[error("failed to encode reply: {source}")]
    Encode {
        /// Underlying serializer failure.
        #[source]
        source: serde_json::Error,
    },
    /// Writing to the output failed.
    #[error("failed to write reply: {source}")]
    Write {
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

/// A request frame that could not be turned into a [`crate::http::Request`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame exceeded the line limit.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    TooLarge {
        /// Frame size in bytes.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },
    /// The frame is not a valid request object.
    #[error("malformed request JSON: {source}")]
    Json {
        /// Underlying parser failure.
        #[source]
        source: serde_json::Error,
    },
    /// The method, URI or a header is not valid HTTP.
    #[error("invalid request: {source}")]
    Request {
        /// Underlying HTTP failure.
        #[source]
        source: HttpError,
    },
}
