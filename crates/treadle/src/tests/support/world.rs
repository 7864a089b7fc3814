//! BDD test world: configuration, transport script, reporter and the outcome
//! of one worker run.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use treadle_config::Config;

use crate::bootstrap::{
    Bootstrap, BootstrapError, StaticConfigLoader, WorkerContext, bootstrap_with,
};
use crate::events::Phase;
use crate::http::{Reply, Request};
use crate::welcome;
use crate::worker::{WorkerError, WorkerStats};

use super::config_loader::FailingConfigLoader;
use super::reporter::RecordingHealthReporter;
use super::transport::ScriptedTransport;

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    config: Config,
    failing_loader: bool,
    bootstrapped: bool,
    pub transport: ScriptedTransport,
    pub reporter: Rc<RecordingHealthReporter>,
    pub flushes: Rc<Cell<usize>>,
    context: Option<WorkerContext>,
    bootstrap_error: Option<BootstrapError>,
    outcome: Option<Result<WorkerStats, WorkerError>>,
}

impl TestWorld {
    /// Builds a world serving the welcome application with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            failing_loader: false,
            bootstrapped: false,
            transport: ScriptedTransport::default(),
            reporter: Rc::new(RecordingHealthReporter::default()),
            flushes: Rc::new(Cell::new(0)),
            context: None,
            bootstrap_error: None,
            outcome: None,
        }
    }

    /// Mutable access to the configuration used by the next run.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Makes configuration loading fail.
    pub fn use_failing_loader(&mut self) {
        self.failing_loader = true;
    }

    /// Loads configuration through the bootstrap sequence.
    pub fn bootstrap(&mut self) -> Option<Bootstrap> {
        let reporter = Rc::clone(&self.reporter);
        let result = if self.failing_loader {
            bootstrap_with(&FailingConfigLoader, reporter)
        } else {
            bootstrap_with(&StaticConfigLoader::new(self.config.clone()), reporter)
        };
        match result {
            Ok(bootstrap) => {
                self.bootstrapped = true;
                Some(bootstrap)
            }
            Err(error) => {
                self.bootstrap_error = Some(error);
                None
            }
        }
    }

    /// Bootstraps, assembles and runs the worker until the script ends.
    pub fn run(&mut self) {
        let Some(bootstrap) = self.bootstrap() else {
            return;
        };
        let builder = welcome::install(bootstrap.into_builder());
        let context = builder.context().clone();
        let mut worker = match builder.build(self.transport.clone()) {
            Ok(worker) => worker,
            Err(error) => {
                self.bootstrap_error = Some(error);
                return;
            }
        };
        let flushes = Rc::clone(&self.flushes);
        worker.events_mut().on(Phase::Flush, Some("counter"), move || {
            flushes.set(flushes.get() + 1);
            Ok(())
        });
        self.context = Some(context);
        self.outcome = Some(worker.run());
    }

    /// Queues a `GET` for `uri`.
    pub fn request(&self, uri: &str) {
        self.transport.push_get(uri);
    }

    /// Queues a `GET` for `uri` carrying the session cookie of the last reply.
    pub fn request_with_session(&self, uri: &str) {
        let request = Request::from_uri("GET", uri).expect("test uri");
        self.transport.push_with_cookie(request, &self.config.session_name);
    }

    /// Reply number `position`, counted from one.
    pub fn reply(&self, position: usize) -> Option<Reply> {
        position
            .checked_sub(1)
            .and_then(|index| self.transport.replies().get(index).cloned())
    }

    /// Shared handles of the last assembled worker.
    pub fn context(&self) -> Option<&WorkerContext> {
        self.context.as_ref()
    }

    /// Returns true once bootstrap succeeded.
    #[must_use]
    pub fn bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    /// Returns the bootstrap error, if any.
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    /// Returns the outcome of the last run, if it ran.
    pub fn outcome(&self) -> Option<&Result<WorkerStats, WorkerError>> {
        self.outcome.as_ref()
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
