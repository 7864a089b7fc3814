//! Request/response transformers composed around the dispatcher.
//!
//! A [`MiddlewareChain`] is a linked list of owned nodes: each node holds one
//! [`Middleware`] and the rest of the chain, which it exposes to the
//! middleware as the continuation. The last link is the terminal
//! [`RequestHandler`]. A middleware may call the continuation once, replace
//! the request it forwards, replace the reply it returns, or return early.

mod access_log;
mod chain;
mod errors;
mod session;
mod try_catch;

use std::rc::Rc;

use strum::{Display, EnumString};

use crate::http::{Reply, Request};

pub use access_log::AccessLogMiddleware;
pub use chain::MiddlewareChain;
pub use errors::{ChainError, CycleError};
pub use session::SessionMiddleware;
pub use try_catch::TryCatchMiddleware;

pub(crate) const MIDDLEWARE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::middleware");

/// Handles a request and produces a reply.
pub trait RequestHandler {
    /// Handles one request.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError`] when the request cannot be answered.
    fn handle(&self, request: Request) -> Result<Reply, CycleError>;
}

impl<T> RequestHandler for Rc<T>
where
    T: RequestHandler + ?Sized,
{
    fn handle(&self, request: Request) -> Result<Reply, CycleError> {
        (**self).handle(request)
    }
}

impl<T> RequestHandler for Box<T>
where
    T: RequestHandler + ?Sized,
{
    fn handle(&self, request: Request) -> Result<Reply, CycleError> {
        (**self).handle(request)
    }
}

/// One transformer in the chain.
pub trait Middleware {
    /// Processes `request`, usually by delegating to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError`] when the middleware or the rest of the chain
    /// fails.
    fn process(&self, request: Request, next: &dyn RequestHandler) -> Result<Reply, CycleError>;
}

impl<F> Middleware for F
where
    F: Fn(Request, &dyn RequestHandler) -> Result<Reply, CycleError>,
{
    fn process(&self, request: Request, next: &dyn RequestHandler) -> Result<Reply, CycleError> {
        self(request, next)
    }
}

/// Built-in middlewares selectable by name in configuration.
///
/// Names are kebab-case; snake_case spellings are accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum MiddlewareKind {
    /// Converts escaped errors into a 500 reply.
    #[strum(to_string = "try-catch", serialize = "try_catch")]
    TryCatch,
    /// Closes the session after the inner chain.
    Session,
    /// Logs one event per request.
    #[strum(to_string = "access-log", serialize = "access_log")]
    AccessLog,
}

/// Error returned when a middleware name is not built in.
pub type MiddlewareKindParseError = strum::ParseError;
