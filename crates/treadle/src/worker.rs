//! The persistent request loop.
//!
//! A [`Worker`] fires `start`, then repeatedly receives from its
//! [`Transport`], runs the middleware chain and responds, firing `flush`
//! after every served request. End of input fires `stop` and ends the loop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, error};

use crate::events::{EventsError, LifecycleEvents, Phase};
use crate::health::HealthReporter;
use crate::http::{CurrentRequest, Reply, Request, SharedResponse};
use crate::middleware::{CycleError, RequestHandler};
use crate::transport::{Incoming, Transport, TransportError};

pub(crate) const WORKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker");

/// Fatal worker failures.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The transport failed while waiting for a request.
    #[error("failed to receive request: {source}")]
    Receive {
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },
    /// The transport failed while delivering a reply.
    #[error("failed to deliver reply: {source}")]
    Respond {
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },
    /// A `start` or `stop` callback failed.
    #[error(transparent)]
    Lifecycle(#[from] EventsError),
}

/// A failure that escaped the middleware chain and became a 500 reply.
#[derive(Debug, Error)]
pub enum CycleFailure {
    /// The chain returned an error.
    #[error(transparent)]
    Error(#[from] CycleError),
    /// The chain panicked.
    #[error("request handler panicked: {message}")]
    Panic {
        /// Panic payload rendered as text.
        message: String,
    },
}

/// Counters for one [`Worker::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Requests that reached the middleware chain.
    pub served: usize,
    /// Frames answered with the fixed 400 reply.
    pub rejected: usize,
    /// Requests answered with the fixed 500 reply.
    pub failed: usize,
}

/// Request loop over one transport.
pub struct Worker<T> {
    transport: T,
    handler: Box<dyn RequestHandler>,
    events: LifecycleEvents,
    request: CurrentRequest,
    response: SharedResponse,
    reporter: Rc<dyn HealthReporter>,
    stats: WorkerStats,
}

impl<T: Transport> Worker<T> {
    /// Creates a worker.
    pub fn new(
        transport: T,
        handler: impl RequestHandler + 'static,
        events: LifecycleEvents,
        request: CurrentRequest,
        response: SharedResponse,
        reporter: Rc<dyn HealthReporter>,
    ) -> Self {
        Self {
            transport,
            handler: Box::new(handler),
            events,
            request,
            response,
            reporter,
            stats: WorkerStats::default(),
        }
    }

    /// Lifecycle registry, for callbacks added after assembly.
    pub fn events_mut(&mut self) -> &mut LifecycleEvents {
        &mut self.events
    }

    /// Counters of the current run.
    #[must_use]
    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Returns the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Runs until the transport shuts down or fails.
    ///
    /// `stop` fires on both paths; its failure is returned only after a
    /// clean shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when a transport operation or a `start`/`stop`
    /// callback fails.
    pub fn run(&mut self) -> Result<WorkerStats, WorkerError> {
        self.stats = WorkerStats::default();
        self.reporter.worker_starting();
        self.events.invoke(Phase::Start)?;

        let outcome = self.serve_until_shutdown();
        let stopped = self.events.invoke(Phase::Stop);
        self.reporter.worker_stopped();

        match (outcome, stopped) {
            (Err(failure), Err(stop_failure)) => {
                error!(
                    target: WORKER_TARGET,
                    error = %stop_failure,
                    "stop callbacks failed after transport failure"
                );
                Err(failure)
            }
            (Err(failure), Ok(_)) => Err(failure),
            (Ok(()), Err(stop_failure)) => Err(stop_failure.into()),
            (Ok(()), Ok(_)) => Ok(self.stats),
        }
    }

    fn serve_until_shutdown(&mut self) -> Result<(), WorkerError> {
        loop {
            let incoming = self.transport.receive().map_err(|source| {
                error!(target: WORKER_TARGET, error = %source, "receive failed");
                self.reporter.transport_failed(&source);
                WorkerError::Receive { source }
            })?;
            match incoming {
                Incoming::Shutdown => {
                    debug!(target: WORKER_TARGET, "shutdown requested");
                    return Ok(());
                }
                Incoming::Malformed(decode_error) => {
                    self.stats.rejected += 1;
                    self.reporter.request_rejected(&decode_error);
                    self.deliver(&Reply::bad_request())?;
                }
                Incoming::Request(request) => self.serve(request)?,
            }
        }
    }

    fn serve(&mut self, request: Request) -> Result<(), WorkerError> {
        self.stats.served += 1;
        self.response.borrow_mut().cleanup();
        self.request.set(request.clone());

        let handler = &self.handler;
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(request)));
        let reply = match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(cycle_error)) => self.fail(&CycleFailure::from(cycle_error)),
            Err(payload) => self.fail(&CycleFailure::Panic {
                message: panic_message(payload.as_ref()),
            }),
        };

        let delivered = self.deliver(&reply);
        if delivered.is_ok() {
            self.reporter.request_served(&reply);
        }
        self.flush();
        delivered
    }

    fn fail(&mut self, failure: &CycleFailure) -> Reply {
        self.stats.failed += 1;
        error!(target: WORKER_TARGET, error = %failure, "request cycle failed");
        self.reporter.request_failed(failure);
        Reply::internal_server_error()
    }

    fn deliver(&mut self, reply: &Reply) -> Result<(), WorkerError> {
        self.transport.respond(reply).map_err(|source| {
            error!(target: WORKER_TARGET, error = %source, "respond failed");
            self.reporter.transport_failed(&source);
            WorkerError::Respond { source }
        })
    }

    fn flush(&mut self) {
        if let Err(flush_error) = self.events.invoke(Phase::Flush) {
            error!(
                target: WORKER_TARGET,
                failed = ?flush_error.failed_names(),
                error = %flush_error,
                "flush callbacks failed"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
