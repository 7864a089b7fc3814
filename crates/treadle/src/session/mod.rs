//! Per-request session lifecycle.
//!
//! A [`Session`] is an explicit object bound to the current request (for the
//! incoming cookie) and the shared response (for the outgoing cookie). It is
//! opened lazily during a request and must be closed before the cycle's
//! `flush` completes; the session middleware guarantees this. State found
//! resident at the next start is treated as a leak: it is discarded and
//! [`SessionError::LeakDetected`] aborts that request.
//!
//! Ids are accepted from the request only when they exist in storage, and a
//! payload without creation metadata whose id came from the cookie is
//! re-keyed once (fixation guard).

mod data;
mod errors;
mod id;
mod storage;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, error, warn};
use treadle_config::SessionCookiePolicy;

use crate::events::{LifecycleEvents, Phase};
use crate::http::{Cookie, CurrentRequest, Expiry, SharedResponse};

pub use data::SessionData;
pub use errors::{SessionError, StorageError};
pub use storage::{MemoryStorage, SessionStorage};

#[cfg(test)]
pub use storage::MockSessionStorage;

use data::SECTION_EXPIRY;

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Name of the flush callback registered by [`Session::attach`].
pub const SESSION_FLUSH_CALLBACK: &str = "session";

/// Shared handle to the worker's session.
pub type SessionHandle = Rc<RefCell<Session>>;

struct ActiveSession {
    id: String,
    data: SessionData,
}

/// Session bound to the current request and response.
pub struct Session {
    policy: SessionCookiePolicy,
    storage: Box<dyn SessionStorage>,
    request: CurrentRequest,
    response: SharedResponse,
    active: Option<ActiveSession>,
    started_this_cycle: bool,
    regenerated: bool,
    cookie_rejected: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("name", &self.policy.name)
            .field("id", &self.id())
            .field("started_this_cycle", &self.started_this_cycle)
            .field("regenerated", &self.regenerated)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates an unstarted session.
    pub fn new(
        policy: SessionCookiePolicy,
        storage: impl SessionStorage + 'static,
        request: CurrentRequest,
        response: SharedResponse,
    ) -> Self {
        Self {
            policy,
            storage: Box::new(storage),
            request,
            response,
            active: None,
            started_this_cycle: false,
            regenerated: false,
            cookie_rejected: false,
        }
    }

    /// Wraps the session in a shared handle.
    #[must_use]
    pub fn into_handle(self) -> SessionHandle {
        Rc::new(RefCell::new(self))
    }

    /// Registers the `flush` callback that ends the session cycle.
    pub fn attach(handle: &SessionHandle, events: &mut LifecycleEvents) {
        let session = Rc::clone(handle);
        events.on(Phase::Flush, Some(SESSION_FLUSH_CALLBACK), move || {
            session.try_borrow_mut()?.end_cycle();
            Ok(())
        });
    }

    /// Cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.policy.name
    }

    /// Current session id, if a session is resident.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.id.as_str())
    }

    /// Reports whether the session was started by the current cycle.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started_this_cycle && self.active.is_some()
    }

    /// Reports whether a session exists for the current request.
    ///
    /// A cookie already found stale during this cycle no longer counts.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.active.is_some() || (!self.cookie_rejected && self.request_cookie().is_some())
    }

    /// Starts the session; a second call in the same cycle does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LeakDetected`] when state from an earlier
    /// cycle is still resident (the state is discarded), or a storage error.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.begin(false)
    }

    /// Persists the session and resets all in-memory state.
    ///
    /// The cookie is sent when the id differs from the request cookie. State
    /// is reset even when persisting fails.
    ///
    /// # Errors
    ///
    /// Returns the cookie or storage error after resetting.
    pub fn close(&mut self) -> Result<(), SessionError> {
        let Some(mut active) = self.active.take() else {
            self.reset();
            return Ok(());
        };
        self.reset();

        let cookie_result = if self.request_cookie().as_deref() == Some(active.id.as_str()) {
            Ok(())
        } else {
            self.send_cookie(&active.id)
        };

        active.data.compact();
        let payload = active
            .data
            .encode()
            .map_err(|source| SessionError::Encode { source })?;
        self.storage.write(&active.id, &payload)?;
        debug!(target: SESSION_TARGET, session = %active.id, "session closed");
        cookie_result
    }

    /// Removes stored data and instructs the client to drop the cookie.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotStarted`] without an active session, or the
    /// storage or cookie error.
    pub fn destroy(&mut self) -> Result<(), SessionError> {
        let active = self.active.take().ok_or(SessionError::NotStarted)?;
        self.reset();
        self.storage.destroy(&active.id)?;
        self.delete_cookie()?;
        debug!(target: SESSION_TARGET, session = %active.id, "session destroyed");
        Ok(())
    }

    /// Moves the session to a fresh id; only once per cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotStarted`] without an active session, or the
    /// storage error from removing the old id.
    pub fn regenerate_id(&mut self) -> Result<(), SessionError> {
        if self.regenerated {
            return Ok(());
        }
        let active = self.active.as_mut().ok_or(SessionError::NotStarted)?;
        let old = std::mem::replace(&mut active.id, id::generate());
        self.storage.destroy(&old)?;
        self.regenerated = true;
        debug!(target: SESSION_TARGET, "session id regenerated");
        Ok(())
    }

    /// Ends the cycle: clears per-cycle markers and reports a session left
    /// open so that the next start detects the leak.
    pub fn end_cycle(&mut self) {
        if let Some(active) = &self.active {
            error!(
                target: SESSION_TARGET,
                session = %active.id,
                "session left open at end of request cycle"
            );
        }
        self.started_this_cycle = false;
        self.regenerated = false;
        self.cookie_rejected = false;
    }

    /// Reads a value; starts the session only when a cookie is present.
    ///
    /// # Errors
    ///
    /// Returns the start error.
    pub fn get(&mut self, section: &str, key: &str) -> Result<Option<Value>, SessionError> {
        self.auto_start(false)?;
        Ok(self
            .active
            .as_ref()
            .and_then(|active| active.data.sections.get(section))
            .and_then(|values| values.get(key))
            .cloned())
    }

    /// Writes a value, starting the session if needed.
    ///
    /// # Errors
    ///
    /// Returns the start error.
    pub fn set(&mut self, section: &str, key: &str, value: Value) -> Result<(), SessionError> {
        self.auto_start(true)?;
        let active = self.active.as_mut().ok_or(SessionError::NotStarted)?;
        active
            .data
            .sections
            .entry(section.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
        Ok(())
    }

    /// Removes a value and its expiry.
    ///
    /// # Errors
    ///
    /// Returns the start error.
    pub fn remove(&mut self, section: &str, key: &str) -> Result<Option<Value>, SessionError> {
        self.auto_start(false)?;
        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };
        if let Some(expiries) = active.data.expiries.get_mut(section) {
            expiries.remove(key);
        }
        Ok(active
            .data
            .sections
            .get_mut(section)
            .and_then(|values| values.remove(key)))
    }

    /// Removes a whole section, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns the start error.
    pub fn remove_section(&mut self, section: &str) -> Result<bool, SessionError> {
        self.auto_start(false)?;
        let Some(active) = self.active.as_mut() else {
            return Ok(false);
        };
        active.data.expiries.remove(section);
        Ok(active.data.sections.remove(section).is_some())
    }

    /// Reports whether a section exists and is not empty.
    ///
    /// # Errors
    ///
    /// Returns the start error.
    pub fn has_section(&mut self, section: &str) -> Result<bool, SessionError> {
        self.auto_start(false)?;
        Ok(self
            .active
            .as_ref()
            .and_then(|active| active.data.sections.get(section))
            .is_some_and(|values| !values.is_empty()))
    }

    /// Names of all sections.
    ///
    /// # Errors
    ///
    /// Returns the start error.
    pub fn sections(&mut self) -> Result<Vec<String>, SessionError> {
        self.auto_start(false)?;
        Ok(self
            .active
            .as_ref()
            .map(|active| active.data.sections.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Expires a key (or the whole section when `key` is `None`) after `after`.
    ///
    /// # Errors
    ///
    /// Returns the start error.
    pub fn set_expiration(
        &mut self,
        section: &str,
        key: Option<&str>,
        after: Duration,
    ) -> Result<(), SessionError> {
        self.auto_start(true)?;
        let active = self.active.as_mut().ok_or(SessionError::NotStarted)?;
        let seconds = i64::try_from(after.as_secs()).unwrap_or(i64::MAX);
        let deadline = now().saturating_add(seconds);
        active
            .data
            .expiries
            .entry(section.to_owned())
            .or_default()
            .insert(key.unwrap_or(SECTION_EXPIRY).to_owned(), deadline);
        Ok(())
    }

    fn auto_start(&mut self, for_write: bool) -> Result<(), SessionError> {
        if self.is_started() || (!for_write && !self.exists()) {
            return Ok(());
        }
        self.begin(!for_write)
    }

    fn begin(&mut self, must_exist: bool) -> Result<(), SessionError> {
        if self.started_this_cycle && self.active.is_some() {
            return Ok(());
        }
        if let Some(stale) = self.active.take() {
            self.reset();
            error!(
                target: SESSION_TARGET,
                session = %stale.id,
                "session state leaked from a previous request"
            );
            return Err(SessionError::LeakDetected { id: stale.id });
        }

        let cookie = self.request_cookie();
        let stored = match cookie.as_deref().filter(|candidate| id::is_valid(candidate)) {
            Some(candidate) => self
                .storage
                .read(candidate)?
                .map(|payload| (candidate.to_owned(), payload)),
            None => None,
        };

        let (session_id, payload) = match stored {
            Some(found) => found,
            None if must_exist => {
                // Cookie names a session storage no longer knows.
                self.cookie_rejected = true;
                self.delete_cookie()?;
                return Ok(());
            }
            None => (id::generate(), Vec::new()),
        };

        let mut data = SessionData::decode(&payload).unwrap_or_else(|error| {
            warn!(
                target: SESSION_TARGET,
                error = %error,
                "discarding undecodable session payload"
            );
            SessionData::default()
        });
        let timestamp = now();
        let fresh = data.created_at.is_none();
        data.expire(timestamp);
        if fresh {
            data.created_at = Some(timestamp);
        }

        let from_cookie = cookie.as_deref() == Some(session_id.as_str());
        self.active = Some(ActiveSession {
            id: session_id,
            data,
        });
        self.started_this_cycle = true;

        if fresh && from_cookie {
            self.regenerate_id()?;
        }
        debug!(target: SESSION_TARGET, "session started");
        Ok(())
    }

    fn reset(&mut self) {
        self.started_this_cycle = false;
        self.regenerated = false;
    }

    fn request_cookie(&self) -> Option<String> {
        self.request
            .try_get()
            .and_then(|request| request.cookie(&self.policy.name).map(str::to_owned))
    }

    fn send_cookie(&self, session_id: &str) -> Result<(), SessionError> {
        let expiry = self.policy.lifetime.map_or(Expiry::Session, Expiry::In);
        let mut cookie = Cookie::new(&self.policy.name, session_id)
            .expires(expiry)
            .path(&self.policy.path)
            .secure(self.policy.secure)
            .same_site(self.policy.same_site);
        if let Some(domain) = &self.policy.domain {
            cookie = cookie.domain(domain);
        }
        self.response.borrow_mut().set_cookie(&cookie)?;
        Ok(())
    }

    fn delete_cookie(&self) -> Result<(), SessionError> {
        self.response.borrow_mut().delete_cookie(
            &self.policy.name,
            Some(&self.policy.path),
            self.policy.domain.as_deref(),
            Some(self.policy.secure),
        )?;
        Ok(())
    }
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
