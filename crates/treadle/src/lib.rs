//! Persistent application worker.
//!
//! A treadle worker is started once and then serves requests one at a time
//! for the rest of its life. Each request flows through
//!
//! ```text
//! Transport -> Worker -> MiddlewareChain -> ApplicationDispatcher -> handler
//! ```
//!
//! and the reply travels back the same way. Because the process is never
//! restarted between requests, every piece of per-request state is either
//! reset at the start of a cycle (the shared [`crate::http::Response`]) or
//! released by a `flush` callback registered on [`events::LifecycleEvents`]:
//! request-scoped services, the session cycle marker, the current request slot
//! and the dispatcher observers.
//!
//! [`WorkerBuilder`] assembles a worker from [`treadle_config::Config`]; the
//! `treadle` binary serves the small [`welcome`] application over a JSON Lines
//! stdio transport.

mod bootstrap;
pub mod dispatch;
pub mod events;
mod health;
pub mod http;
mod launch;
pub mod middleware;
pub mod services;
pub mod session;
mod telemetry;
pub mod transport;
pub mod welcome;
mod worker;

/// Boxed error used for failures raised by application code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use bootstrap::{
    Bootstrap, BootstrapError, ConfigLoader, REQUEST_FLUSH_CALLBACK, StaticConfigLoader,
    SystemConfigLoader, WorkerBuilder, WorkerContext, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use launch::{LaunchError, run_worker, run_worker_with};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use worker::{CycleFailure, Worker, WorkerError, WorkerStats};

#[cfg(test)]
mod tests;
