//! Session persistence backends.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{SESSION_TARGET, StorageError};

/// Persistence for serialized session payloads keyed by session id.
#[cfg_attr(test, mockall::automock)]
pub trait SessionStorage {
    /// Reads the payload stored for `id`; `None` when it is unknown or expired.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend cannot be read.
    fn read(&mut self, id: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Stores `payload` under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend cannot be written.
    fn write(&mut self, id: &str, payload: &[u8]) -> Result<(), StorageError>;

    /// Removes `id`; removing an unknown id succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend cannot be written.
    fn destroy(&mut self, id: &str) -> Result<(), StorageError>;
}

#[derive(Debug)]
struct Stored {
    payload: Vec<u8>,
    written_at: Instant,
}

/// In-process storage whose entries expire `lifetime` after their last write.
///
/// Writes sweep expired entries at most once per `lifetime`. Clones share the
/// same entries.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    entries: Rc<RefCell<HashMap<String, Stored>>>,
    lifetime: Duration,
    last_sweep: Rc<Cell<Instant>>,
}

impl MemoryStorage {
    /// Creates empty storage with the given garbage-collection lifetime.
    #[must_use]
    pub fn new(lifetime: Duration) -> Self {
        Self {
            entries: Rc::new(RefCell::new(HashMap::new())),
            lifetime,
            last_sweep: Rc::new(Cell::new(Instant::now())),
        }
    }

    /// Reports whether `id` holds a live entry.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .borrow()
            .get(id)
            .is_some_and(|stored| stored.written_at.elapsed() < self.lifetime)
    }

    /// Number of stored entries, including expired ones not yet collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Reports whether no entry is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drops expired entries and returns how many were removed.
    pub fn collect_garbage(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, stored| stored.written_at.elapsed() < self.lifetime);
        self.last_sweep.set(Instant::now());
        before - entries.len()
    }

    fn sweep_if_due(&self) {
        if self.last_sweep.get().elapsed() < self.lifetime {
            return;
        }
        let removed = self.collect_garbage();
        if removed > 0 {
            debug!(target: SESSION_TARGET, removed, "expired sessions collected");
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(treadle_config::DEFAULT_SESSION_GC_LIFETIME)
    }
}

impl SessionStorage for MemoryStorage {
    fn read(&mut self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let mut entries = self.entries.borrow_mut();
        let expired = entries
            .get(id)
            .is_some_and(|stored| stored.written_at.elapsed() >= self.lifetime);
        if expired {
            entries.remove(id);
            return Ok(None);
        }
        Ok(entries.get(id).map(|stored| stored.payload.clone()))
    }

    fn write(&mut self, id: &str, payload: &[u8]) -> Result<(), StorageError> {
        self.sweep_if_due();
        self.entries.borrow_mut().insert(
            id.to_owned(),
            Stored {
                payload: payload.to_vec(),
                written_at: Instant::now(),
            },
        );
        Ok(())
    }

    fn destroy(&mut self, id: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(id);
        Ok(())
    }
}
