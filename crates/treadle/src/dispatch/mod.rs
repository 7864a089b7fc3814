//! Application dispatch: routing, handler creation, forwards and recovery.
//!
//! The [`ApplicationDispatcher`] is the terminal handler of the middleware
//! chain. For every request it walks the states
//!
//! ```text
//! Idle -> Routing -> Dispatching -> (Forwarding)* -> Rendering -> Done
//!                         \-> ErrorRecovery (once, when enabled)
//! ```
//!
//! Routing asks the [`Router`] for parameters and reads the handler name from
//! the reserved [`HANDLER_KEY`]. Dispatching creates a fresh handler through
//! the [`HandlerFactory`] and runs it; a [`HandlerOutcome::Forward`] loops
//! with a new [`DispatchRequest`] until the attempt budget is spent.

mod dispatcher;
mod errors;
mod handler;
mod observer;
mod request;
mod router;

pub use dispatcher::{ApplicationDispatcher, DISPATCHER_FLUSH_CALLBACK, DispatcherSettings};
pub use errors::DispatchError;
pub use handler::{HandlerFactory, HandlerOutcome, HandlerRegistry, HandlerResponse, Presenter};
pub use observer::{DispatchObserver, TracingDispatchObserver};
pub use request::{DispatchMethod, DispatchRequest, FailureContext, Params};
pub use router::{HANDLER_KEY, PathRouter, Router};
