//! Read-only hooks into the dispatcher state machine.

use tracing::{debug, warn};

use super::errors::DispatchError;
use super::handler::HandlerResponse;
use super::request::DispatchRequest;
use super::router::DISPATCH_TARGET;

/// Observes dispatcher progress without influencing it.
///
/// Every method has an empty default so observers implement only what they
/// need.
pub trait DispatchObserver {
    /// A dispatch run began.
    fn startup(&self) {}

    /// A request is about to be dispatched.
    fn request(&self, _request: &DispatchRequest) {}

    /// A handler instance was created.
    fn handler_created(&self, _name: &str) {}

    /// A handler produced a response.
    fn response(&self, _response: &HandlerResponse) {}

    /// Dispatch failed, including failures of error recovery.
    fn error(&self, _error: &DispatchError) {}

    /// A dispatch run finished; `error` is the failure that ended it, if any.
    fn shutdown(&self, _error: Option<&DispatchError>) {}

    /// The request cycle is being flushed.
    fn flush(&self) {}
}

/// Logs dispatcher progress as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDispatchObserver;

impl DispatchObserver for TracingDispatchObserver {
    fn request(&self, request: &DispatchRequest) {
        debug!(
            target: DISPATCH_TARGET,
            handler = request.handler(),
            forward = request.is_forward(),
            "dispatching request"
        );
    }

    fn handler_created(&self, name: &str) {
        debug!(target: DISPATCH_TARGET, handler = name, "handler created");
    }

    fn response(&self, response: &HandlerResponse) {
        let kind = match response {
            HandlerResponse::Text { .. } => "text",
            HandlerResponse::Json(_) => "json",
            HandlerResponse::Redirect { .. } => "redirect",
            HandlerResponse::Void => "void",
        };
        debug!(target: DISPATCH_TARGET, kind, "handler responded");
    }

    fn error(&self, error: &DispatchError) {
        warn!(
            target: DISPATCH_TARGET,
            kind = error.kind(),
            status = error.status().as_u16(),
            error = %error,
            "dispatch failed"
        );
    }
}
