//! Closes the session once the inner chain has produced a reply.

use tracing::warn;

use super::{CycleError, MIDDLEWARE_TARGET, Middleware, RequestHandler};
use crate::http::header::SET_COOKIE;
use crate::http::{HeaderValue, Reply, Request, SharedResponse};
use crate::session::SessionHandle;

/// Closes the session on every path out of the inner chain.
///
/// Cookies written to the shared response while closing are copied onto the
/// reply, since the reply was snapshotted before the session closed.
#[derive(Debug, Clone)]
pub struct SessionMiddleware {
    session: SessionHandle,
    response: SharedResponse,
}

impl SessionMiddleware {
    /// Creates the middleware for the worker's session and response.
    #[must_use]
    pub fn new(session: SessionHandle, response: SharedResponse) -> Self {
        Self { session, response }
    }

    fn cookie_count(&self) -> usize {
        self.response.borrow().headers().get_all(SET_COOKIE).iter().count()
    }

    fn cookies_since(&self, count: usize) -> Vec<HeaderValue> {
        self.response
            .borrow()
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .skip(count)
            .cloned()
            .collect()
    }
}

impl Middleware for SessionMiddleware {
    fn process(&self, request: Request, next: &dyn RequestHandler) -> Result<Reply, CycleError> {
        let outcome = next.handle(request);
        let before = self.cookie_count();
        let closed = self.session.try_borrow_mut().map_or_else(
            |error| Err(CycleError::middleware("session", error)),
            |mut session| session.close().map_err(CycleError::from),
        );

        match (outcome, closed) {
            (Ok(mut reply), Ok(())) => {
                for cookie in self.cookies_since(before) {
                    reply.headers.append(SET_COOKIE, cookie);
                }
                Ok(reply)
            }
            (Ok(_), Err(close_error)) => Err(close_error),
            (Err(failure), Err(close_error)) => {
                warn!(
                    target: MIDDLEWARE_TARGET,
                    error = %close_error,
                    "session close failed after request failure"
                );
                Err(failure)
            }
            (Err(failure), Ok(())) => Err(failure),
        }
    }
}
