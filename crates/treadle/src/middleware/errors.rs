//! Errors flowing through the middleware chain.

use thiserror::Error;

use crate::BoxError;
use crate::dispatch::DispatchError;
use crate::http::{HttpError, StatusCode};
use crate::session::SessionError;

/// Chain assembly failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// A chain needs at least one middleware.
    #[error("middleware chain requires at least one middleware")]
    Empty,
}

/// Errors escaping a handler or middleware during a request cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Application dispatch failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// Session lifecycle failed.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Response manipulation failed.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// A named middleware failed.
    #[error("middleware '{name}' failed: {source}")]
    Middleware {
        /// Middleware name.
        name: String,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },
}

impl CycleError {
    /// Creates a named middleware failure.
    pub fn middleware(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Middleware {
            name: name.into(),
            source: source.into(),
        }
    }

    /// HTTP status that best describes the failure.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Dispatch(error) => error.status(),
            Self::Session(_) | Self::Http(_) | Self::Middleware { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
