//! Per-cycle handles shared by the worker, session and dispatcher.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use super::{CookieDefaults, HttpError, Request, Response};

/// Handle to the worker-lifetime [`Response`].
#[derive(Debug, Clone, Default)]
pub struct SharedResponse {
    inner: Rc<RefCell<Response>>,
}

impl SharedResponse {
    /// Wraps a fresh response using the given cookie defaults.
    #[must_use]
    pub fn new(cookie_defaults: CookieDefaults) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Response::new(cookie_defaults))),
        }
    }

    /// Immutably borrows the response.
    ///
    /// # Panics
    ///
    /// Panics if the response is currently mutably borrowed.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, Response> {
        self.inner.borrow()
    }

    /// Mutably borrows the response.
    ///
    /// # Panics
    ///
    /// Panics if the response is currently borrowed.
    #[must_use]
    pub fn borrow_mut(&self) -> RefMut<'_, Response> {
        self.inner.borrow_mut()
    }
}

/// Slot holding the request of the cycle in flight.
///
/// Set by the worker before the chain runs and cleared on `flush`.
#[derive(Debug, Clone, Default)]
pub struct CurrentRequest {
    slot: Rc<RefCell<Option<Rc<Request>>>>,
}

impl CurrentRequest {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `request` to the current cycle.
    pub fn set(&self, request: Request) -> Rc<Request> {
        let request = Rc::new(request);
        *self.slot.borrow_mut() = Some(Rc::clone(&request));
        request
    }

    /// Returns the bound request.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::RequestNotSet`] outside a request cycle.
    pub fn get(&self) -> Result<Rc<Request>, HttpError> {
        self.try_get().ok_or(HttpError::RequestNotSet)
    }

    /// Returns the bound request, if any.
    #[must_use]
    pub fn try_get(&self) -> Option<Rc<Request>> {
        self.slot.borrow().clone()
    }

    /// Drops the bound request.
    pub fn clear(&self) {
        self.slot.borrow_mut().take();
    }

    /// Reports whether a request is bound.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.slot.borrow().is_some()
    }
}
