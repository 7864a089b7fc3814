//! Scripted transport feeding the worker a fixed sequence of frames.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use crate::http::{Reply, Request, header_strs};
use crate::transport::{DecodeError, Incoming, Transport, TransportError};

enum Frame {
    Request(Request),
    WithCookieFromLastReply { request: Request, cookie: String },
    Malformed,
    Failure,
}

#[derive(Default)]
struct Script {
    frames: VecDeque<Frame>,
    replies: Vec<Reply>,
    fail_responses: bool,
}

/// Transport whose frames are queued up front; an empty queue is shutdown.
///
/// Clones share the script, so tests keep a handle while the worker owns
/// another.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Rc<RefCell<Script>>,
}

impl ScriptedTransport {
    /// Queues a request.
    pub fn push(&self, request: Request) {
        self.script.borrow_mut().frames.push_back(Frame::Request(request));
    }

    /// Queues a `GET` for `uri`.
    pub fn push_get(&self, uri: &str) {
        self.push(Request::from_uri("GET", uri).expect("test uri"));
    }

    /// Queues a request that carries the named cookie as last set by a reply.
    pub fn push_with_cookie(&self, request: Request, cookie: &str) {
        self.script
            .borrow_mut()
            .frames
            .push_back(Frame::WithCookieFromLastReply {
                request,
                cookie: cookie.to_owned(),
            });
    }

    /// Queues an undecodable frame.
    pub fn push_malformed(&self) {
        self.script.borrow_mut().frames.push_back(Frame::Malformed);
    }

    /// Queues a receive failure.
    pub fn push_failure(&self) {
        self.script.borrow_mut().frames.push_back(Frame::Failure);
    }

    /// Makes every later `respond` fail.
    pub fn fail_responses(&self) {
        self.script.borrow_mut().fail_responses = true;
    }

    /// Replies delivered so far.
    pub fn replies(&self) -> Vec<Reply> {
        self.script.borrow().replies.clone()
    }

    fn latest_cookie(&self, name: &str) -> Option<String> {
        let prefix = format!("{name}=");
        self.script.borrow().replies.iter().rev().find_map(|reply| {
            header_strs(&reply.headers, "set-cookie")
                .filter_map(|cookie| cookie.strip_prefix(&prefix))
                .filter_map(|rest| rest.split(';').next())
                .last()
                .map(str::to_owned)
        })
    }
}

impl Transport for ScriptedTransport {
    fn receive(&mut self) -> Result<Incoming, TransportError> {
        let frame = self.script.borrow_mut().frames.pop_front();
        match frame {
            None => Ok(Incoming::Shutdown),
            Some(Frame::Request(request)) => Ok(Incoming::Request(request)),
            Some(Frame::WithCookieFromLastReply { request, cookie }) => {
                let request = match self.latest_cookie(&cookie) {
                    Some(value) => request.with_cookie(cookie, value),
                    None => request,
                };
                Ok(Incoming::Request(request))
            }
            Some(Frame::Malformed) => {
                let source = serde_json::from_str::<serde_json::Value>("{")
                    .expect_err("truncated JSON must fail");
                Ok(Incoming::Malformed(DecodeError::Json { source }))
            }
            Some(Frame::Failure) => Err(TransportError::Read {
                source: io::Error::new(io::ErrorKind::BrokenPipe, "front end went away"),
            }),
        }
    }

    fn respond(&mut self, reply: &Reply) -> Result<(), TransportError> {
        let mut script = self.script.borrow_mut();
        if script.fail_responses {
            return Err(TransportError::Write {
                source: io::Error::new(io::ErrorKind::BrokenPipe, "front end went away"),
            });
        }
        script.replies.push(reply.clone());
        Ok(())
    }
}
