//! Worker bootstrap and assembly.
//!
//! [`bootstrap_with`] loads configuration and installs telemetry.
//! [`WorkerBuilder`] then wires the shared per-cycle handles, the dispatcher,
//! the configured middlewares and every `flush` hook into a [`Worker`].

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;
use tracing::debug;
use treadle_config::Config;

use crate::dispatch::{
    ApplicationDispatcher, DispatchObserver, DispatcherSettings, HandlerFactory, HandlerRegistry,
    PathRouter, Router,
};
use crate::events::{LifecycleEvents, Phase};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::http::{CookieDefaults, CurrentRequest, SharedResponse};
use crate::middleware::{
    AccessLogMiddleware, ChainError, Middleware, MiddlewareChain, MiddlewareKind,
    MiddlewareKindParseError, SessionMiddleware, TryCatchMiddleware,
};
use crate::services::ServiceStore;
use crate::session::{MemoryStorage, Session, SessionHandle, SessionStorage};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::Transport;
use crate::worker::Worker;

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Name of the flush callback clearing the current request slot.
pub const REQUEST_FLUSH_CALLBACK: &str = "request";

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader {
    /// Loads the worker configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader error when any configuration layer is invalid.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader reading files, environment and process arguments.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_layers()
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// A configured middleware name is neither built in nor registered.
    #[error("unknown middleware '{name}'")]
    UnknownMiddleware {
        /// Configured name.
        name: String,
        /// Parser failure.
        #[source]
        source: MiddlewareKindParseError,
    },
    /// The middleware chain could not be assembled.
    #[error("failed to assemble middleware chain: {source}")]
    Chain {
        /// Underlying chain error.
        #[source]
        source: ChainError,
    },
}

/// Result of a successful [`bootstrap_with`] invocation.
pub struct Bootstrap {
    config: Config,
    telemetry: TelemetryHandle,
    reporter: Rc<dyn HealthReporter>,
}

impl Bootstrap {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Starts assembling a worker with in-memory session storage.
    #[must_use]
    pub fn into_builder(self) -> WorkerBuilder {
        WorkerBuilder::new(self.config).reporter(self.reporter)
    }
}

/// Loads configuration and installs telemetry, reporting each outcome.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration or telemetry fails.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Rc<dyn HealthReporter>,
) -> Result<Bootstrap, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&config);
    Ok(Bootstrap {
        config,
        telemetry,
        reporter,
    })
}

/// Per-worker handles shared with application code.
///
/// All handles point at the same state for the whole life of the worker;
/// the worker and the `flush` hooks reset their contents between requests.
#[derive(Clone)]
pub struct WorkerContext {
    config: Rc<Config>,
    request: CurrentRequest,
    response: SharedResponse,
    services: Rc<ServiceStore>,
    session: SessionHandle,
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("request_bound", &self.request.is_set())
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl WorkerContext {
    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Slot holding the request being served.
    #[must_use]
    pub fn request(&self) -> &CurrentRequest {
        &self.request
    }

    /// Response shared by the whole cycle.
    #[must_use]
    pub fn response(&self) -> &SharedResponse {
        &self.response
    }

    /// Service store.
    #[must_use]
    pub fn services(&self) -> &Rc<ServiceStore> {
        &self.services
    }

    /// Session bound to the current request and response.
    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }
}

type MiddlewareFactory = Box<dyn Fn(&WorkerContext) -> Box<dyn Middleware>>;

/// Assembles a [`Worker`] from configuration and application parts.
///
/// Configured middleware names resolve to factories registered with
/// [`WorkerBuilder::middleware`] first, then to the built-in middlewares.
pub struct WorkerBuilder {
    context: WorkerContext,
    router: Box<dyn Router>,
    handlers: Box<dyn HandlerFactory>,
    middlewares: BTreeMap<String, MiddlewareFactory>,
    observers: Vec<Rc<dyn DispatchObserver>>,
    reporter: Rc<dyn HealthReporter>,
}

impl WorkerBuilder {
    /// Creates a builder keeping sessions in memory.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let storage = MemoryStorage::new(config.session_policy().gc_lifetime);
        Self::with_session_storage(config, storage)
    }

    /// Creates a builder persisting sessions through `storage`.
    pub fn with_session_storage(config: Config, storage: impl SessionStorage + 'static) -> Self {
        let policy = config.session_policy();
        let request = CurrentRequest::new();
        let response = SharedResponse::new(CookieDefaults::from(&policy));
        let session = Session::new(policy, storage, request.clone(), response.clone()).into_handle();
        Self {
            context: WorkerContext {
                config: Rc::new(config),
                request,
                response,
                services: Rc::new(ServiceStore::new()),
                session,
            },
            router: Box::new(PathRouter::new()),
            handlers: Box::new(HandlerRegistry::new()),
            middlewares: BTreeMap::new(),
            observers: Vec::new(),
            reporter: Rc::new(StructuredHealthReporter::new()),
        }
    }

    /// Shared handles, for wiring application handlers and services.
    #[must_use]
    pub fn context(&self) -> &WorkerContext {
        &self.context
    }

    /// Sets the router.
    #[must_use]
    pub fn router(mut self, router: impl Router + 'static) -> Self {
        self.router = Box::new(router);
        self
    }

    /// Sets the handler factory.
    #[must_use]
    pub fn handlers(mut self, handlers: impl HandlerFactory + 'static) -> Self {
        self.handlers = Box::new(handlers);
        self
    }

    /// Registers a named middleware that configuration may list.
    #[must_use]
    pub fn middleware<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&WorkerContext) -> Box<dyn Middleware> + 'static,
    {
        self.middlewares.insert(name.into(), Box::new(factory));
        self
    }

    /// Adds a dispatcher observer.
    #[must_use]
    pub fn observer(mut self, observer: Rc<dyn DispatchObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Sets the health reporter.
    #[must_use]
    pub fn reporter(mut self, reporter: Rc<dyn HealthReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Builds the worker over `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::UnknownMiddleware`] for unresolvable
    /// middleware names and [`BootstrapError::Chain`] when no middleware is
    /// configured.
    pub fn build<T: Transport>(self, transport: T) -> Result<Worker<T>, BootstrapError> {
        let reporter = Rc::clone(&self.reporter);
        self.assemble(transport)
            .inspect_err(|error| reporter.bootstrap_failed(error))
    }

    fn assemble<T: Transport>(self, transport: T) -> Result<Worker<T>, BootstrapError> {
        let Self {
            context,
            router,
            handlers,
            middlewares: custom,
            observers,
            reporter,
        } = self;

        let chain_parts = resolve_middlewares(&context, &custom)?;

        let mut dispatcher = ApplicationDispatcher::new(
            router,
            handlers,
            context.request.clone(),
            context.response.clone(),
            DispatcherSettings::from(context.config()),
        );
        for observer in observers {
            dispatcher.add_observer(observer);
        }
        let dispatcher = Rc::new(dispatcher);

        let chain = MiddlewareChain::new(chain_parts, Box::new(Rc::clone(&dispatcher)))
            .map_err(|source| BootstrapError::Chain { source })?;

        let mut events = LifecycleEvents::new();
        Session::attach(&context.session, &mut events);
        context.services.attach(&mut events);
        let request = context.request.clone();
        events.on(Phase::Flush, Some(REQUEST_FLUSH_CALLBACK), move || {
            request.clear();
            Ok(())
        });
        dispatcher.attach(&mut events);

        debug!(
            target: BOOTSTRAP_TARGET,
            middlewares = ?context.config().middlewares(),
            flush = ?events.names(Phase::Flush),
            "worker assembled"
        );

        Ok(Worker::new(
            transport,
            chain,
            events,
            context.request.clone(),
            context.response.clone(),
            reporter,
        ))
    }
}

fn resolve_middlewares(
    context: &WorkerContext,
    custom: &BTreeMap<String, MiddlewareFactory>,
) -> Result<Vec<Box<dyn Middleware>>, BootstrapError> {
    context
        .config()
        .middlewares()
        .iter()
        .map(|name| {
            if let Some(factory) = custom.get(name) {
                return Ok(factory(context));
            }
            let kind = name
                .trim()
                .parse::<MiddlewareKind>()
                .map_err(|source| BootstrapError::UnknownMiddleware {
                    name: name.clone(),
                    source,
                })?;
            Ok(builtin(kind, context))
        })
        .collect()
}

fn builtin(kind: MiddlewareKind, context: &WorkerContext) -> Box<dyn Middleware> {
    match kind {
        MiddlewareKind::TryCatch => Box::new(TryCatchMiddleware::new(context.config().debug_mode)),
        MiddlewareKind::Session => Box::new(SessionMiddleware::new(
            Rc::clone(&context.session),
            context.response.clone(),
        )),
        MiddlewareKind::AccessLog => Box::new(AccessLogMiddleware),
    }
}
