//! Application-level requests travelling through the dispatcher.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::http::{Method, StatusCode};

/// Named parameters produced by the router or supplied by a forward.
pub type Params = BTreeMap<String, Value>;

/// How a [`DispatchRequest`] entered the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchMethod {
    /// Derived from the incoming HTTP request with this method.
    Http(Method),
    /// Produced internally by a handler or by error recovery.
    Forward,
}

/// Description of the failure that triggered error recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureContext {
    /// Failure class, as reported by [`super::DispatchError::kind`].
    pub kind: &'static str,
    /// Status set on the response before recovery.
    pub status: StatusCode,
    /// Rendered failure message.
    pub message: String,
    /// Last request processed before the failure, if any.
    pub request: Option<Box<DispatchRequest>>,
}

/// A request addressed to a named handler.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    handler: String,
    method: DispatchMethod,
    params: Params,
    post: Params,
    secured: bool,
    failure: Option<FailureContext>,
}

impl DispatchRequest {
    /// Creates a request for `handler`.
    pub fn new(handler: impl Into<String>, method: DispatchMethod, params: Params) -> Self {
        Self {
            handler: handler.into(),
            method,
            params,
            post: Params::new(),
            secured: false,
            failure: None,
        }
    }

    /// Creates a forward to `handler`.
    pub fn forward(handler: impl Into<String>, params: Params) -> Self {
        Self::new(handler, DispatchMethod::Forward, params)
    }

    /// Attaches a parsed body snapshot.
    #[must_use]
    pub fn with_post(mut self, post: Params) -> Self {
        self.post = post;
        self
    }

    /// Marks the request as received over a secure channel.
    #[must_use]
    pub fn with_secured(mut self, secured: bool) -> Self {
        self.secured = secured;
        self
    }

    /// Attaches the failure that led to this request.
    #[must_use]
    pub fn with_failure(mut self, failure: FailureContext) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Target handler name.
    #[must_use]
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Request origin.
    #[must_use]
    pub fn method(&self) -> &DispatchMethod {
        &self.method
    }

    /// Whether the request was produced by a forward.
    #[must_use]
    pub fn is_forward(&self) -> bool {
        self.method == DispatchMethod::Forward
    }

    /// All parameters.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// One parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// One parameter as a string slice.
    #[must_use]
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }

    /// Parsed body snapshot.
    #[must_use]
    pub fn post(&self) -> &Params {
        &self.post
    }

    /// Whether the originating request was secure.
    #[must_use]
    pub fn is_secured(&self) -> bool {
        self.secured
    }

    /// Failure context for error handlers.
    #[must_use]
    pub fn failure(&self) -> Option<&FailureContext> {
        self.failure.as_ref()
    }
}
