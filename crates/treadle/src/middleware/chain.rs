//! Linked middleware chain.

use std::fmt;

use tracing::trace;

use super::{ChainError, CycleError, MIDDLEWARE_TARGET, Middleware, RequestHandler};
use crate::http::{Reply, Request};

enum Link {
    Node {
        middleware: Box<dyn Middleware>,
        rest: Box<Link>,
    },
    Terminal(Box<dyn RequestHandler>),
}

impl RequestHandler for Link {
    fn handle(&self, request: Request) -> Result<Reply, CycleError> {
        match self {
            Self::Node { middleware, rest } => middleware.process(request, rest.as_ref()),
            Self::Terminal(handler) => handler.handle(request),
        }
    }
}

/// Middlewares composed in declared order around a terminal handler.
pub struct MiddlewareChain {
    head: Link,
    len: usize,
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MiddlewareChain")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl MiddlewareChain {
    /// Composes `middlewares` (outermost first) around `terminal`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Empty`] when no middleware is given.
    pub fn new(
        middlewares: Vec<Box<dyn Middleware>>,
        terminal: Box<dyn RequestHandler>,
    ) -> Result<Self, ChainError> {
        if middlewares.is_empty() {
            return Err(ChainError::Empty);
        }
        let len = middlewares.len();
        let head = middlewares
            .into_iter()
            .rev()
            .fold(Link::Terminal(terminal), |rest, middleware| Link::Node {
                middleware,
                rest: Box::new(rest),
            });
        Ok(Self { head, len })
    }

    /// Number of middlewares in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`; empty chains cannot be built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl RequestHandler for MiddlewareChain {
    fn handle(&self, request: Request) -> Result<Reply, CycleError> {
        trace!(
            target: MIDDLEWARE_TARGET,
            middlewares = self.len,
            path = request.path(),
            "entering middleware chain"
        );
        self.head.handle(request)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rstest::rstest;

    use super::*;
    use crate::http::StatusCode;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recording {
        label: &'static str,
        log: Log,
        forward: bool,
    }

    impl Middleware for Recording {
        fn process(
            &self,
            request: Request,
            next: &dyn RequestHandler,
        ) -> Result<Reply, CycleError> {
            self.log.borrow_mut().push(format!("{}:before", self.label));
            if !self.forward {
                return Ok(Reply::new(StatusCode::NO_CONTENT));
            }
            let reply = next.handle(request);
            self.log.borrow_mut().push(format!("{}:after", self.label));
            reply
        }
    }

    struct Terminal {
        log: Log,
    }

    impl RequestHandler for Terminal {
        fn handle(&self, request: Request) -> Result<Reply, CycleError> {
            self.log.borrow_mut().push(format!("terminal:{}", request.path()));
            Ok(Reply::new(StatusCode::OK))
        }
    }

    fn chain(log: &Log, forwards: &[(&'static str, bool)]) -> MiddlewareChain {
        let middlewares = forwards
            .iter()
            .map(|(label, forward)| {
                Box::new(Recording {
                    label: *label,
                    log: Rc::clone(log),
                    forward: *forward,
                }) as Box<dyn Middleware>
            })
            .collect();
        MiddlewareChain::new(
            middlewares,
            Box::new(Terminal {
                log: Rc::clone(log),
            }),
        )
        .expect("non-empty chain")
    }

    fn request() -> Request {
        Request::from_uri("GET", "/home").expect("parse uri")
    }

    #[rstest]
    fn runs_middlewares_once_in_declared_order() {
        let log = Log::default();
        let reply = chain(&log, &[("a", true), ("b", true), ("c", true)])
            .handle(request())
            .expect("reply");
        assert_eq!(reply.status, 200);
        assert_eq!(
            *log.borrow(),
            vec![
                "a:before", "b:before", "c:before", "terminal:/home", "c:after", "b:after",
                "a:after",
            ]
        );
    }

    #[rstest]
    fn short_circuit_skips_the_rest() {
        let log = Log::default();
        let reply = chain(&log, &[("a", true), ("b", false), ("c", true)])
            .handle(request())
            .expect("reply");
        assert_eq!(reply.status, 204);
        assert_eq!(*log.borrow(), vec!["a:before", "b:before", "a:after"]);
    }

    #[rstest]
    fn empty_chain_is_rejected() {
        let log = Log::default();
        let result = MiddlewareChain::new(Vec::new(), Box::new(Terminal { log }));
        assert!(matches!(result, Err(ChainError::Empty)));
    }

    #[rstest]
    fn closures_can_replace_the_request() {
        let log = Log::default();
        let rewrite = |request: Request, next: &dyn RequestHandler| {
            let rewritten = Request::from_uri(request.method().as_str(), "/rewritten")?;
            next.handle(rewritten)
        };
        let chain = MiddlewareChain::new(
            vec![Box::new(rewrite)],
            Box::new(Terminal {
                log: Rc::clone(&log),
            }),
        )
        .expect("non-empty chain");
        chain.handle(request()).expect("reply");
        assert_eq!(*log.borrow(), vec!["terminal:/rewritten"]);
    }
}
