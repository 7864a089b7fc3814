//! Structured health reporting for worker lifecycle events.

use std::rc::Rc;

use treadle_config::Config;

use crate::bootstrap::BootstrapError;
use crate::http::Reply;
use crate::transport::{DecodeError, TransportError};
use crate::worker::CycleFailure;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked before the worker fires its `start` phase.
    fn worker_starting(&self);

    /// Invoked after a reply produced by the application was handed over.
    fn request_served(&self, reply: &Reply);

    /// Invoked when a frame could not be decoded.
    fn request_rejected(&self, error: &DecodeError);

    /// Invoked when a failure escaped the middleware chain.
    fn request_failed(&self, failure: &CycleFailure);

    /// Invoked when the transport failed.
    fn transport_failed(&self, error: &TransportError);

    /// Invoked after the worker left its loop.
    fn worker_stopped(&self);
}

impl<T> HealthReporter for Rc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn worker_starting(&self) {
        (**self).worker_starting();
    }

    fn request_served(&self, reply: &Reply) {
        (**self).request_served(reply);
    }

    fn request_rejected(&self, error: &DecodeError) {
        (**self).request_rejected(error);
    }

    fn request_failed(&self, failure: &CycleFailure) {
        (**self).request_failed(failure);
    }

    fn transport_failed(&self, error: &TransportError) {
        (**self).transport_failed(error);
    }

    fn worker_stopped(&self) {
        (**self).worker_stopped();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting worker bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            middlewares = ?config.middlewares(),
            max_loop = config.max_loop,
            "worker bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "worker bootstrap failed"
        );
    }

    fn worker_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "worker_starting",
            "worker loop starting"
        );
    }

    fn request_served(&self, reply: &Reply) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "request_served",
            status = reply.status.as_u16(),
            "request served"
        );
    }

    fn request_rejected(&self, error: &DecodeError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "request_rejected",
            error = %error,
            "request rejected"
        );
    }

    fn request_failed(&self, failure: &CycleFailure) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "request_failed",
            error = %failure,
            "request failed"
        );
    }

    fn transport_failed(&self, error: &TransportError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "transport_failed",
            error = %error,
            "transport failed"
        );
    }

    fn worker_stopped(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "worker_stopped",
            "worker loop stopped"
        );
    }
}
