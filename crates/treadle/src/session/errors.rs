//! Error types for the session lifecycle.

use thiserror::Error;

use crate::BoxError;
use crate::http::HttpError;

/// Failure reported by a [`super::SessionStorage`] backend.
#[derive(Debug, Error)]
#[error("session storage failed: {message}")]
pub struct StorageError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl StorageError {
    /// Creates a storage error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a storage error wrapping an underlying failure.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Errors surfaced by [`super::Session`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session state from an earlier cycle was still resident.
    #[error("session {id} leaked from a previous request; stale state discarded")]
    LeakDetected {
        /// Identifier of the discarded session.
        id: String,
    },
    /// The operation requires a started session.
    #[error("session is not started")]
    NotStarted,
    /// Storage backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Writing the session cookie failed.
    #[error("failed to write session cookie: {source}")]
    Cookie {
        /// Response failure.
        #[source]
        source: HttpError,
    },
    /// Session data could not be serialized.
    #[error("failed to encode session data: {source}")]
    Encode {
        /// Serializer failure.
        #[source]
        source: serde_json::Error,
    },
}

impl From<HttpError> for SessionError {
    fn from(source: HttpError) -> Self {
        Self::Cookie { source }
    }
}
