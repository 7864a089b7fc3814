//! Lazily created named services with scope-tagged eviction.
//!
//! Services tagged [`Scope::Request`] are evicted on every `flush` so that
//! per-request state (the signed-in user, a unit of work) cannot be observed
//! by the next request. [`Scope::Process`] services live as long as the
//! worker.

use std::any::{Any, type_name};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::BoxError;
use crate::events::{LifecycleEvents, Phase};

const SERVICES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::services");

/// Name of the flush callback registered by [`ServiceStore::attach`].
pub const SERVICES_FLUSH_CALLBACK: &str = "services";

/// Lifetime of a cached service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Lives for the whole worker process.
    Process,
    /// Dropped at the end of every request cycle.
    Request,
}

impl fmt::Display for Scope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Process => "process",
            Self::Request => "request",
        })
    }
}

/// Errors surfaced while resolving services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No service is registered under the name.
    #[error("unknown service '{name}'")]
    Unknown {
        /// Requested name.
        name: String,
    },
    /// The cached instance has a different type.
    #[error("service '{name}' is not a {expected}")]
    TypeMismatch {
        /// Requested name.
        name: String,
        /// Requested type.
        expected: &'static str,
    },
    /// The factory returned an error.
    #[error("failed to create service '{name}': {source}")]
    Factory {
        /// Requested name.
        name: String,
        /// Factory failure.
        #[source]
        source: BoxError,
    },
    /// The factory depends on the service it is creating.
    #[error("service '{name}' depends on itself")]
    Cycle {
        /// Requested name.
        name: String,
    },
}

type Factory = Rc<dyn Fn(&ServiceStore) -> Result<Rc<dyn Any>, BoxError>>;

struct Slot {
    scope: Scope,
    factory: Factory,
    instance: Option<Rc<dyn Any>>,
}

/// Store mapping service names to factories and cached instances.
#[derive(Default)]
pub struct ServiceStore {
    slots: RefCell<BTreeMap<String, Slot>>,
    resolving: RefCell<Vec<String>>,
}

impl fmt::Debug for ServiceStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.borrow();
        let mut map = formatter.debug_map();
        for (name, slot) in slots.iter() {
            map.entry(name, &(slot.scope, slot.instance.is_some()));
        }
        map.finish()
    }
}

impl ServiceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`, replacing any previous registration
    /// and its cached instance.
    ///
    /// The factory receives the store so it can resolve its dependencies.
    pub fn register<T, F>(&self, name: impl Into<String>, scope: Scope, factory: F)
    where
        T: Any,
        F: Fn(&Self) -> Result<T, BoxError> + 'static,
    {
        let factory: Factory =
            Rc::new(move |store| factory(store).map(|value| Rc::new(value) as Rc<dyn Any>));
        self.slots.borrow_mut().insert(
            name.into(),
            Slot {
                scope,
                factory,
                instance: None,
            },
        );
    }

    /// Returns the instance for `name`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the name is unknown, the instance has a
    /// different type, the factory fails or depends on itself.
    pub fn get<T: Any>(&self, name: &str) -> Result<Rc<T>, ServiceError> {
        let instance = match self.cached(name)? {
            Some(instance) => instance,
            None => self.create(name)?,
        };
        instance
            .downcast::<T>()
            .map_err(|_| ServiceError::TypeMismatch {
                name: name.to_owned(),
                expected: type_name::<T>(),
            })
    }

    fn cached(&self, name: &str) -> Result<Option<Rc<dyn Any>>, ServiceError> {
        let slots = self.slots.borrow();
        let slot = slots.get(name).ok_or_else(|| ServiceError::Unknown {
            name: name.to_owned(),
        })?;
        Ok(slot.instance.clone())
    }

    fn create(&self, name: &str) -> Result<Rc<dyn Any>, ServiceError> {
        if self.resolving.borrow().iter().any(|pending| pending == name) {
            return Err(ServiceError::Cycle {
                name: name.to_owned(),
            });
        }
        let factory = self
            .slots
            .borrow()
            .get(name)
            .map(|slot| Rc::clone(&slot.factory))
            .ok_or_else(|| ServiceError::Unknown {
                name: name.to_owned(),
            })?;

        let created = {
            let _resolving = ResolvingGuard::enter(self, name);
            factory(self)
        };

        let instance = created.map_err(|source| ServiceError::Factory {
            name: name.to_owned(),
            source,
        })?;
        if let Some(slot) = self.slots.borrow_mut().get_mut(name) {
            slot.instance = Some(Rc::clone(&instance));
        }
        debug!(target: SERVICES_TARGET, service = name, "service instantiated");
        Ok(instance)
    }

    /// Drops the cached instance of `name`, returning whether one existed.
    pub fn evict(&self, name: &str) -> bool {
        self.slots
            .borrow_mut()
            .get_mut(name)
            .and_then(|slot| slot.instance.take())
            .is_some()
    }

    /// Drops every cached instance tagged `scope` and returns their names.
    pub fn evict_tagged(&self, scope: Scope) -> Vec<String> {
        let mut slots = self.slots.borrow_mut();
        slots
            .iter_mut()
            .filter(|(_, slot)| slot.scope == scope)
            .filter_map(|(name, slot)| slot.instance.take().map(|_| name.clone()))
            .collect()
    }

    /// Names of all services tagged `scope`.
    #[must_use]
    pub fn tagged(&self, scope: Scope) -> Vec<String> {
        self.slots
            .borrow()
            .iter()
            .filter(|(_, slot)| slot.scope == scope)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Reports whether `name` currently has a cached instance.
    #[must_use]
    pub fn is_instantiated(&self, name: &str) -> bool {
        self.slots
            .borrow()
            .get(name)
            .is_some_and(|slot| slot.instance.is_some())
    }

    /// Reports whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.slots.borrow().contains_key(name)
    }

    /// Registers the `flush` callback that evicts request-scoped instances.
    pub fn attach(self: &Rc<Self>, events: &mut LifecycleEvents) {
        let store = Rc::clone(self);
        events.on(Phase::Flush, Some(SERVICES_FLUSH_CALLBACK), move || {
            let evicted = store.evict_tagged(Scope::Request);
            debug!(
                target: SERVICES_TARGET,
                evicted = ?evicted,
                "request-scoped services evicted"
            );
            Ok(())
        });
    }
}

/// Marks a service as under construction until dropped, unwinding included.
struct ResolvingGuard<'a> {
    store: &'a ServiceStore,
}

impl<'a> ResolvingGuard<'a> {
    fn enter(store: &'a ServiceStore, name: &str) -> Self {
        store.resolving.borrow_mut().push(name.to_owned());
        Self { store }
    }
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        self.store.resolving.borrow_mut().pop();
    }
}
