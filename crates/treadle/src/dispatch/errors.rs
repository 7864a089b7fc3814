//! Error types for application dispatch failures.
//!
//! Every variant maps onto an HTTP status through [`DispatchError::status`],
//! which the error-recovery path and the `try-catch` middleware both use.

use thiserror::Error;

use crate::BoxError;
use crate::http::{HttpError, StatusCode};

/// Errors surfaced while routing, dispatching or rendering a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The router found no route for the request.
    #[error("no route for {method} {path}")]
    NotFound {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// The request cannot be served as asked.
    #[error("bad request: {message}")]
    BadRequest {
        /// Client error status, 404 unless stated otherwise.
        status: StatusCode,
        /// Human-readable reason.
        message: String,
        /// Failure that was masked as a bad request.
        #[source]
        source: Option<Box<DispatchError>>,
    },

    /// More dispatch attempts than allowed in one run.
    #[error("application loop detected: more than {max_loop} dispatch attempts")]
    ApplicationLoop {
        /// Configured attempt budget.
        max_loop: usize,
    },

    /// The handler factory could not create the named handler.
    #[error("cannot create handler '{handler}': {message}")]
    InvalidHandler {
        /// Handler name.
        handler: String,
        /// Reason reported by the factory.
        message: String,
    },

    /// A handler failed while running.
    #[error("handler '{handler}' failed: {source}")]
    Handler {
        /// Handler name.
        handler: String,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },

    /// The route matched but did not name a handler.
    #[error("route matched without a '{key}' parameter")]
    MissingHandler {
        /// Reserved parameter key.
        key: &'static str,
    },

    /// Writing the handler response failed.
    #[error("failed to render response: {source}")]
    Render {
        /// Underlying failure.
        #[source]
        source: HttpError,
    },
}

impl DispatchError {
    /// Creates a not-found error for the given request line.
    pub fn not_found(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NotFound {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Creates a bad-request error with the default 404 status.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::bad_request_with_status(StatusCode::NOT_FOUND, message)
    }

    /// Creates a bad-request error with an explicit client error status.
    pub fn bad_request_with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::BadRequest {
            status,
            message: message.into(),
            source: None,
        }
    }

    /// Masks another dispatch failure as a bad request.
    pub fn masked(message: impl Into<String>, source: Self) -> Self {
        Self::BadRequest {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a handler creation failure.
    pub fn invalid_handler(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidHandler {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Wraps a failure raised by a running handler.
    pub fn handler(handler: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Handler {
            handler: handler.into(),
            source: source.into(),
        }
    }

    /// HTTP status describing the failure.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { status, .. } => *status,
            Self::ApplicationLoop { .. }
            | Self::InvalidHandler { .. }
            | Self::Handler { .. }
            | Self::MissingHandler { .. }
            | Self::Render { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable name of the failure class.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not-found",
            Self::BadRequest { .. } => "bad-request",
            Self::ApplicationLoop { .. } => "application-loop",
            Self::InvalidHandler { .. } => "invalid-handler",
            Self::Handler { .. } => "handler",
            Self::MissingHandler { .. } => "missing-handler",
            Self::Render { .. } => "render",
        }
    }
}

impl From<HttpError> for DispatchError {
    fn from(source: HttpError) -> Self {
        Self::Render { source }
    }
}
