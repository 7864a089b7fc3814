//! Mapping HTTP requests onto handler names.
//!
//! A [`Router`] turns an incoming [`Request`] into a parameter map. The
//! reserved [`HANDLER_KEY`] parameter names the handler that should serve the
//! request; the dispatcher removes it before the parameters reach the handler.

use serde_json::Value;
use tracing::trace;

use super::request::Params;
use crate::http::Request;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Parameter naming the target handler.
pub const HANDLER_KEY: &str = "handler";

/// Resolves a request to routing parameters.
#[cfg_attr(test, mockall::automock)]
pub trait Router {
    /// Returns the parameters of the first matching route, if any.
    fn route(&self, request: &Request) -> Option<Params>;
}

impl<T: Router + ?Sized> Router for Box<T> {
    fn route(&self, request: &Request) -> Option<Params> {
        (**self).route(request)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone)]
struct Route {
    method: Option<String>,
    segments: Vec<Segment>,
    handler: String,
    defaults: Params,
}

impl Route {
    fn matches_method(&self, method: &str) -> bool {
        self.method
            .as_deref()
            .is_none_or(|expected| expected.eq_ignore_ascii_case(method))
    }

    fn capture(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = split_path(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut captured = Params::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Placeholder(name) => {
                    captured.insert(name.clone(), Value::String(part.to_owned()));
                }
            }
        }
        Some(captured)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|part| !part.is_empty())
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    split_path(pattern)
        .map(|part| {
            part.strip_prefix('<')
                .and_then(|rest| rest.strip_suffix('>'))
                .map_or_else(
                    || Segment::Literal(part.to_owned()),
                    |name| Segment::Placeholder(name.to_owned()),
                )
        })
        .collect()
}

/// Table router matching method and path.
///
/// Path patterns are literal segments with optional `<name>` placeholders,
/// e.g. `/users/<id>`. Parameters are layered: query string first, then
/// placeholders, then route defaults and the handler name. A `handler` query
/// parameter is never honoured.
#[derive(Debug, Clone, Default)]
pub struct PathRouter {
    routes: Vec<Route>,
}

impl PathRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route; `method` of `None` matches every method.
    #[must_use]
    pub fn add(self, method: Option<&str>, pattern: &str, handler: &str) -> Self {
        self.add_with_defaults(method, pattern, handler, Params::new())
    }

    /// Adds a route carrying fixed default parameters.
    #[must_use]
    pub fn add_with_defaults(
        mut self,
        method: Option<&str>,
        pattern: &str,
        handler: &str,
        defaults: Params,
    ) -> Self {
        self.routes.push(Route {
            method: method.map(str::to_ascii_uppercase),
            segments: parse_pattern(pattern),
            handler: handler.to_owned(),
            defaults,
        });
        self
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Router for PathRouter {
    fn route(&self, request: &Request) -> Option<Params> {
        let method = request.method().as_str();
        let path = request.path();
        for route in self.routes.iter().filter(|route| route.matches_method(method)) {
            let Some(captured) = route.capture(path) else {
                continue;
            };
            let mut params: Params = request
                .query()
                .into_iter()
                .filter(|(name, _)| name != HANDLER_KEY)
                .map(|(name, value)| (name, Value::String(value)))
                .collect();
            params.extend(captured);
            params.extend(route.defaults.clone());
            params.insert(HANDLER_KEY.to_owned(), Value::String(route.handler.clone()));
            trace!(
                target: DISPATCH_TARGET,
                method,
                path,
                handler = %route.handler,
                "route matched"
            );
            return Some(params);
        }
        None
    }
}
