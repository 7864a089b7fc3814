//! The dispatch state machine.
//!
//! One [`ApplicationDispatcher::run`] routes the bound request, dispatches
//! the resulting [`DispatchRequest`], follows forwards up to the configured
//! bound and renders the final handler response into the shared
//! [`crate::http::Response`]. When error recovery is enabled a failed run is
//! re-dispatched once to the configured error handler.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;
use tracing::{error, info};
use treadle_config::{Config, DEFAULT_INTERNAL_PREFIX, DEFAULT_MAX_LOOP};

use super::errors::DispatchError;
use super::handler::{HandlerFactory, HandlerOutcome};
use super::observer::DispatchObserver;
use super::request::{DispatchMethod, DispatchRequest, FailureContext, Params};
use super::router::{DISPATCH_TARGET, HANDLER_KEY, Router};
use crate::events::{LifecycleEvents, Phase};
use crate::http::{CurrentRequest, Reply, Request, SharedResponse, StatusCode};
use crate::middleware::{CycleError, RequestHandler};

/// Name of the flush callback registered by [`ApplicationDispatcher::attach`].
pub const DISPATCHER_FLUSH_CALLBACK: &str = "dispatcher";

/// Dispatcher policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Dispatch attempts allowed per run.
    pub max_loop: usize,
    /// Whether failures are re-dispatched to the error handler.
    pub catch_exceptions: bool,
    /// Handler serving failures.
    pub error_handler: Option<String>,
    /// Prefix of handler names unreachable from outside.
    pub internal_prefix: String,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            max_loop: DEFAULT_MAX_LOOP,
            catch_exceptions: false,
            error_handler: None,
            internal_prefix: DEFAULT_INTERNAL_PREFIX.to_owned(),
        }
    }
}

impl From<&Config> for DispatcherSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_loop: config.max_loop,
            catch_exceptions: config.catch_exceptions,
            error_handler: config.error_handler().map(str::to_owned),
            internal_prefix: config.internal_prefix.clone(),
        }
    }
}

impl DispatcherSettings {
    fn recovery_handler(&self) -> Option<&str> {
        if self.catch_exceptions {
            self.error_handler.as_deref()
        } else {
            None
        }
    }

    fn is_error_handler(&self, name: &str) -> bool {
        self.error_handler
            .as_deref()
            .is_some_and(|handler| handler.eq_ignore_ascii_case(name))
    }

    fn is_internal(&self, name: &str) -> bool {
        !self.internal_prefix.is_empty() && name.starts_with(&self.internal_prefix)
    }
}

#[derive(Debug, Default)]
struct CycleLog {
    requests: Vec<DispatchRequest>,
    handler: Option<String>,
}

/// Terminal request handler running the application.
pub struct ApplicationDispatcher {
    router: Box<dyn Router>,
    factory: Box<dyn HandlerFactory>,
    current_request: CurrentRequest,
    response: SharedResponse,
    settings: DispatcherSettings,
    observers: Vec<Rc<dyn DispatchObserver>>,
    cycle: RefCell<CycleLog>,
}

impl ApplicationDispatcher {
    /// Creates a dispatcher bound to the shared request and response handles.
    pub fn new(
        router: impl Router + 'static,
        factory: impl HandlerFactory + 'static,
        current_request: CurrentRequest,
        response: SharedResponse,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            router: Box::new(router),
            factory: Box::new(factory),
            current_request,
            response,
            settings,
            observers: Vec::new(),
            cycle: RefCell::new(CycleLog::default()),
        }
    }

    /// Adds an observer.
    pub fn add_observer(&mut self, observer: Rc<dyn DispatchObserver>) {
        self.observers.push(observer);
    }

    /// Builder form of [`ApplicationDispatcher::add_observer`].
    #[must_use]
    pub fn with_observer(mut self, observer: Rc<dyn DispatchObserver>) -> Self {
        self.add_observer(observer);
        self
    }

    /// Dispatcher policy.
    #[must_use]
    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Requests processed in the current cycle, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<DispatchRequest> {
        self.cycle.borrow().requests.clone()
    }

    /// Name of the handler created last in the current cycle.
    #[must_use]
    pub fn current_handler(&self) -> Option<String> {
        self.cycle.borrow().handler.clone()
    }

    /// Notifies observers at every cycle flush.
    pub fn attach(self: &Rc<Self>, events: &mut LifecycleEvents) {
        let dispatcher = Rc::clone(self);
        events.on(Phase::Flush, Some(DISPATCHER_FLUSH_CALLBACK), move || {
            dispatcher.notify(|observer| observer.flush());
            Ok(())
        });
    }

    /// Dispatches `request` and returns the finished reply.
    ///
    /// The shared response is marked sent on every path.
    ///
    /// # Errors
    ///
    /// Returns the [`DispatchError`] that ended the run when it was not
    /// recovered.
    pub fn run(&self, request: Request) -> Result<Reply, DispatchError> {
        let request = self.current_request.set(request);
        *self.cycle.borrow_mut() = CycleLog::default();
        self.notify(|observer| observer.startup());

        let outcome = match self
            .initial_request(&request)
            .and_then(|initial| self.dispatch(initial))
        {
            Ok(body) => {
                self.notify(|observer| observer.shutdown(None));
                Ok(body)
            }
            Err(failure) => self.fail(failure),
        };

        let mut response = self.response.borrow_mut();
        response.mark_sent();
        outcome.map(|body| Reply::from_response(&response, body))
    }

    fn notify(&self, event: impl Fn(&dyn DispatchObserver)) {
        for observer in &self.observers {
            event(observer.as_ref());
        }
    }

    fn initial_request(&self, request: &Request) -> Result<DispatchRequest, DispatchError> {
        let mut params = self
            .router
            .route(request)
            .ok_or_else(|| {
                DispatchError::not_found(request.method().as_str(), request.path())
            })?;
        let handler = match params.remove(HANDLER_KEY) {
            Some(Value::String(handler)) => handler,
            _ => return Err(DispatchError::MissingHandler { key: HANDLER_KEY }),
        };
        if self.settings.is_internal(&handler) {
            return Err(DispatchError::bad_request(format!(
                "handler '{handler}' is not reachable from outside"
            )));
        }
        Ok(
            DispatchRequest::new(handler, DispatchMethod::Http(request.method().clone()), params)
                .with_post(request.post().clone())
                .with_secured(request.is_secured()),
        )
    }

    fn dispatch(&self, mut request: DispatchRequest) -> Result<Vec<u8>, DispatchError> {
        let mut attempts = 0;
        loop {
            if attempts >= self.settings.max_loop {
                return Err(DispatchError::ApplicationLoop {
                    max_loop: self.settings.max_loop,
                });
            }
            attempts += 1;

            let first_in_cycle = {
                let mut cycle = self.cycle.borrow_mut();
                cycle.requests.push(request.clone());
                cycle.requests.len() == 1
            };
            self.notify(|observer| observer.request(&request));

            if !request.is_forward() && self.settings.is_error_handler(request.handler()) {
                return Err(DispatchError::bad_request(
                    "the error handler cannot be requested directly",
                ));
            }

            let mut handler = match self.factory.create(request.handler()) {
                Ok(handler) => handler,
                Err(failure) if first_in_cycle => {
                    return Err(DispatchError::masked(
                        format!("handler '{}' not found", request.handler()),
                        failure,
                    ));
                }
                Err(failure) => return Err(failure),
            };
            self.cycle.borrow_mut().handler = Some(request.handler().to_owned());
            self.notify(|observer| observer.handler_created(request.handler()));

            match handler.run(request)? {
                HandlerOutcome::Forward(next) => request = next,
                HandlerOutcome::Respond(rendered) => {
                    self.notify(|observer| observer.response(&rendered));
                    let mut response = self.response.borrow_mut();
                    return rendered.render(&mut response).map_err(DispatchError::from);
                }
            }
        }
    }

    fn fail(&self, failure: DispatchError) -> Result<Vec<u8>, DispatchError> {
        self.notify(|observer| observer.error(&failure));
        let recovered = self
            .settings
            .recovery_handler()
            .and_then(|handler| self.recover(handler, &failure));
        self.notify(|observer| observer.shutdown(Some(&failure)));
        recovered.ok_or(failure)
    }

    fn recover(&self, handler: &str, failure: &DispatchError) -> Option<Vec<u8>> {
        let status = failure.status();
        let code = if status.is_client_error() {
            status
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let last = self.cycle.borrow().requests.last().cloned();
        let secured = last.as_ref().is_some_and(DispatchRequest::is_secured);
        let request = DispatchRequest::forward(handler, Params::new())
            .with_secured(secured)
            .with_failure(FailureContext {
                kind: failure.kind(),
                status: code,
                message: failure.to_string(),
                request: last.map(Box::new),
            });

        self.response.borrow_mut().set_status(code, None);
        match self.dispatch(request) {
            Ok(body) => {
                info!(
                    target: DISPATCH_TARGET,
                    handler,
                    status = code.as_u16(),
                    error = %failure,
                    "request failure handled by error handler"
                );
                Some(body)
            }
            Err(recovery_failure) => {
                error!(
                    target: DISPATCH_TARGET,
                    handler,
                    error = %recovery_failure,
                    original = %failure,
                    "error recovery failed"
                );
                self.notify(|observer| observer.error(&recovery_failure));
                None
            }
        }
    }
}

impl RequestHandler for ApplicationDispatcher {
    fn handle(&self, request: Request) -> Result<Reply, CycleError> {
        Ok(self.run(request)?)
    }
}

#[cfg(test)]
mod tests;
