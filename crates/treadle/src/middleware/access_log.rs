//! One structured log event per request.

use std::time::Instant;

use tracing::info;

use super::{CycleError, Middleware, RequestHandler};
use crate::http::{Reply, Request};

const ACCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::access");

/// Logs method, path, status and elapsed time of every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLogMiddleware;

impl Middleware for AccessLogMiddleware {
    fn process(&self, request: Request, next: &dyn RequestHandler) -> Result<Reply, CycleError> {
        let method = request.method().clone();
        let path = request.path().to_owned();
        let started = Instant::now();
        let outcome = next.handle(request);
        let status = match &outcome {
            Ok(reply) => reply.status.as_u16(),
            Err(failure) => failure.status().as_u16(),
        };
        info!(
            target: ACCESS_TARGET,
            method = %method,
            path = %path,
            status,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            failed = outcome.is_err(),
            "request handled"
        );
        outcome
    }
}
