//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::cell::RefCell;

use treadle_config::Config;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::http::Reply;
use crate::transport::{DecodeError, TransportError};
use crate::worker::CycleFailure;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// The worker loop is starting.
    WorkerStarting,
    /// A reply with this status was delivered.
    RequestServed(u16),
    /// A frame was rejected as malformed.
    RequestRejected,
    /// A failure escaped the chain.
    RequestFailed(String),
    /// The transport failed.
    TransportFailed,
    /// The worker loop stopped.
    WorkerStopped,
}

/// Records every reported event in order.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: RefCell<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events.borrow().clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn worker_starting(&self) {
        self.record(HealthEvent::WorkerStarting);
    }

    fn request_served(&self, reply: &Reply) {
        self.record(HealthEvent::RequestServed(reply.status.as_u16()));
    }

    fn request_rejected(&self, _error: &DecodeError) {
        self.record(HealthEvent::RequestRejected);
    }

    fn request_failed(&self, failure: &CycleFailure) {
        self.record(HealthEvent::RequestFailed(failure.to_string()));
    }

    fn transport_failed(&self, _error: &TransportError) {
        self.record(HealthEvent::TransportFailed);
    }

    fn worker_stopped(&self) {
        self.record(HealthEvent::WorkerStopped);
    }
}
