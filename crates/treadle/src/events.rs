//! Named lifecycle callbacks grouped by phase.
//!
//! Subsystems that keep state across requests register a `flush` callback
//! here; the worker invokes the phase after every response so that nothing
//! from one request is visible to the next.

use std::fmt;

use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, warn};

use crate::BoxError;

const EVENTS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::events");

/// Lifecycle phases driven by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Phase {
    /// Fired once before the first request is received.
    Start,
    /// Fired once after the transport signalled shutdown.
    Stop,
    /// Fired after each response has been handed to the transport.
    Flush,
}

impl Phase {
    /// All phases in firing order.
    pub const ALL: [Self; 3] = [Self::Start, Self::Flush, Self::Stop];
}

/// Error returned when parsing a phase name fails.
pub type PhaseParseError = strum::ParseError;

/// Callback stored in the registry.
pub type LifecycleCallback = Box<dyn FnMut() -> Result<(), BoxError>>;

/// A callback that failed during [`LifecycleEvents::invoke`].
#[derive(Debug)]
pub struct CallbackFailure {
    /// Registered callback name.
    pub name: String,
    /// Error returned by the callback.
    pub source: BoxError,
}

/// Errors surfaced while invoking a phase.
#[derive(Debug, Error)]
pub enum EventsError {
    /// One or more callbacks failed; every callback still ran.
    #[error("{} lifecycle callback(s) failed during {phase}: {}", failures.len(), describe(failures))]
    Callbacks {
        /// Phase being invoked.
        phase: Phase,
        /// Failures in registration order.
        failures: Vec<CallbackFailure>,
    },
}

impl EventsError {
    /// Names of the callbacks that failed.
    #[must_use]
    pub fn failed_names(&self) -> Vec<&str> {
        match self {
            Self::Callbacks { failures, .. } => {
                failures.iter().map(|failure| failure.name.as_str()).collect()
            }
        }
    }
}

fn describe(failures: &[CallbackFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{}: {}", failure.name, failure.source))
        .collect::<Vec<_>>()
        .join("; ")
}

struct Entry {
    name: String,
    callback: LifecycleCallback,
}

/// Registry of named callbacks per [`Phase`].
#[derive(Default)]
pub struct LifecycleEvents {
    start: Vec<Entry>,
    stop: Vec<Entry>,
    flush: Vec<Entry>,
}

impl fmt::Debug for LifecycleEvents {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LifecycleEvents")
            .field("start", &self.names(Phase::Start))
            .field("stop", &self.names(Phase::Stop))
            .field("flush", &self.names(Phase::Flush))
            .finish()
    }
}

impl LifecycleEvents {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `phase` and returns its name.
    ///
    /// Without an explicit name the callback is called `service<N>`, where
    /// `N` is one more than the number of callbacks already registered for the
    /// phase. Registering an existing name replaces that callback in place.
    pub fn on<F>(&mut self, phase: Phase, name: Option<&str>, callback: F) -> String
    where
        F: FnMut() -> Result<(), BoxError> + 'static,
    {
        let entries = self.entries_mut(phase);
        let name = name.map_or_else(|| format!("service{}", entries.len() + 1), str::to_owned);
        let callback: LifecycleCallback = Box::new(callback);

        if let Some(entry) = entries.iter_mut().find(|entry| entry.name == name) {
            entry.callback = callback;
        } else {
            entries.push(Entry {
                name: name.clone(),
                callback,
            });
        }
        name
    }

    /// Removes a named callback, returning whether it existed.
    pub fn remove(&mut self, phase: Phase, name: &str) -> bool {
        let entries = self.entries_mut(phase);
        let before = entries.len();
        entries.retain(|entry| entry.name != name);
        before != entries.len()
    }

    /// Names registered for `phase` in invocation order.
    #[must_use]
    pub fn names(&self, phase: Phase) -> Vec<&str> {
        self.entries(phase)
            .iter()
            .map(|entry| entry.name.as_str())
            .collect()
    }

    /// Runs every callback of `phase` in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::Callbacks`] listing every failed callback once
    /// all callbacks have run.
    pub fn invoke(&mut self, phase: Phase) -> Result<Vec<String>, EventsError> {
        let mut invoked = Vec::new();
        let mut failures = Vec::new();

        for entry in self.entries_mut(phase) {
            invoked.push(entry.name.clone());
            if let Err(source) = (entry.callback)() {
                warn!(
                    target: EVENTS_TARGET,
                    phase = %phase,
                    callback = %entry.name,
                    error = %source,
                    "lifecycle callback failed"
                );
                failures.push(CallbackFailure {
                    name: entry.name.clone(),
                    source,
                });
            }
        }

        debug!(
            target: EVENTS_TARGET,
            phase = %phase,
            invoked = invoked.len(),
            failed = failures.len(),
            "lifecycle phase invoked"
        );

        if failures.is_empty() {
            Ok(invoked)
        } else {
            Err(EventsError::Callbacks { phase, failures })
        }
    }

    fn entries(&self, phase: Phase) -> &Vec<Entry> {
        match phase {
            Phase::Start => &self.start,
            Phase::Stop => &self.stop,
            Phase::Flush => &self.flush,
        }
    }

    fn entries_mut(&mut self, phase: Phase) -> &mut Vec<Entry> {
        match phase {
            Phase::Start => &mut self.start,
            Phase::Stop => &mut self.stop,
            Phase::Flush => &mut self.flush,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rstest::rstest;

    use super::*;

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, label: &'static str) -> LifecycleCallback {
        let log = Rc::clone(log);
        Box::new(move || {
            log.borrow_mut().push(label);
            Ok(())
        })
    }

    #[rstest]
    #[case("start", Phase::Start)]
    #[case("FLUSH", Phase::Flush)]
    #[case("Stop", Phase::Stop)]
    fn parses_phase_names(#[case] input: &str, #[case] expected: Phase) {
        assert_eq!(input.parse::<Phase>(), Ok(expected));
        assert_eq!(expected.to_string(), input.to_ascii_lowercase());
    }

    #[rstest]
    fn rejects_unknown_phase() {
        let error = "restart".parse::<Phase>().expect_err("unknown phase");
        assert_eq!(error, PhaseParseError::VariantNotFound);
    }

    #[rstest]
    fn generates_ordinal_names_per_phase() {
        let mut events = LifecycleEvents::new();
        assert_eq!(events.on(Phase::Flush, None, || Ok(())), "service1");
        assert_eq!(events.on(Phase::Flush, Some("session"), || Ok(())), "session");
        assert_eq!(events.on(Phase::Flush, None, || Ok(())), "service3");
        assert_eq!(events.on(Phase::Start, None, || Ok(())), "service1");
    }

    #[rstest]
    fn overwrite_keeps_original_position() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut events = LifecycleEvents::new();
        events.on(Phase::Flush, Some("a"), recorder(&log, "a1"));
        events.on(Phase::Flush, Some("b"), recorder(&log, "b"));
        events.on(Phase::Flush, Some("a"), recorder(&log, "a2"));

        let invoked = events.invoke(Phase::Flush).expect("flush succeeds");
        assert_eq!(invoked, vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(*log.borrow(), vec!["a2", "b"]);
    }

    #[rstest]
    fn failures_do_not_stop_later_callbacks() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut events = LifecycleEvents::new();
        events.on(Phase::Flush, Some("first"), || Err("first broke".into()));
        events.on(Phase::Flush, Some("middle"), recorder(&log, "middle"));
        events.on(Phase::Flush, Some("last"), || Err("last broke".into()));

        let error = events.invoke(Phase::Flush).expect_err("aggregate failure");
        assert_eq!(error.failed_names(), vec!["first", "last"]);
        assert_eq!(*log.borrow(), vec!["middle"]);
        let message = error.to_string();
        assert!(message.contains("first broke") && message.contains("last broke"));
    }

    #[rstest]
    fn invoking_an_empty_phase_is_ok() {
        let mut events = LifecycleEvents::new();
        assert!(events.invoke(Phase::Stop).expect("empty phase").is_empty());
    }
}
