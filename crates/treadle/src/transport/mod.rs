//! Request transport between the front end and the worker.
//!
//! A [`Transport`] hands the worker one [`Incoming`] item at a time and
//! accepts the finished [`Reply`]. Frames that cannot be decoded are reported
//! as [`Incoming::Malformed`] so the worker can answer them without running
//! the application.

mod errors;
mod json_lines;
mod wire;

use crate::http::{Reply, Request};

pub use self::errors::{DecodeError, TransportError};
pub use self::json_lines::{JsonLinesTransport, MAX_REQUEST_BYTES};

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// One item received from the front end.
#[derive(Debug)]
pub enum Incoming {
    /// A decoded request.
    Request(Request),
    /// A frame that could not be decoded.
    Malformed(DecodeError),
    /// The front end asked the worker to stop.
    Shutdown,
}

/// Source of requests and sink of replies.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Waits for the next item.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the channel fails; the worker stops.
    fn receive(&mut self) -> Result<Incoming, TransportError>;

    /// Sends the reply for the last received request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the reply cannot be delivered.
    fn respond(&mut self, reply: &Reply) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn receive(&mut self) -> Result<Incoming, TransportError> {
        (**self).receive()
    }

    fn respond(&mut self, reply: &Reply) -> Result<(), TransportError> {
        (**self).respond(reply)
    }
}
