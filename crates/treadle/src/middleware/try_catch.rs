//! Converts failures escaping the inner chain into a 500 reply.

use std::error::Error as _;
use std::fmt::Write as _;

use serde_json::json;
use tracing::error;

use super::{CycleError, MIDDLEWARE_TARGET, Middleware, RequestHandler};
use crate::http::header::CONTENT_TYPE;
use crate::http::{HeaderValue, Reply, Request, StatusCode, escape_html};

/// Catches [`CycleError`]s from the rest of the chain.
///
/// Outside debug mode every failure becomes the generic
/// `{"error":"Internal server error"}` reply. In debug mode the reply carries
/// the message, status and source chain: as JSON for programmatic clients,
/// otherwise as an HTML page.
#[derive(Debug, Clone, Copy, Default)]
pub struct TryCatchMiddleware {
    debug: bool,
}

impl TryCatchMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl Middleware for TryCatchMiddleware {
    fn process(&self, request: Request, next: &dyn RequestHandler) -> Result<Reply, CycleError> {
        let wants_json = request.wants_json();
        let path = request.path().to_owned();
        match next.handle(request) {
            Ok(reply) => Ok(reply),
            Err(failure) => {
                error!(
                    target: MIDDLEWARE_TARGET,
                    path = %path,
                    status = failure.status().as_u16(),
                    error = %failure,
                    "request failed"
                );
                if !self.debug {
                    return Ok(Reply::internal_server_error());
                }
                Ok(diagnostic_reply(&failure, wants_json))
            }
        }
    }
}

fn source_chain(failure: &CycleError) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = failure.source();
    while let Some(cause) = current {
        chain.push(cause.to_string());
        current = cause.source();
    }
    chain
}

fn diagnostic_reply(failure: &CycleError, wants_json: bool) -> Reply {
    let message = failure.to_string();
    let code = failure.status().as_u16();
    let trace = source_chain(failure);
    let reply = Reply::new(StatusCode::INTERNAL_SERVER_ERROR);

    if wants_json {
        let body = json!({ "error": message, "code": code, "trace": trace });
        return reply
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(body.to_string());
    }

    let mut page = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
         <title>500 Internal Server Error</title></head><body>\n",
    );
    let _ = writeln!(page, "<h1>{}</h1>", escape_html(&message));
    let _ = writeln!(page, "<p>Status {code}</p>");
    if !trace.is_empty() {
        page.push_str("<h2>Caused by</h2>\n<ol>\n");
        for cause in &trace {
            let _ = writeln!(page, "<li>{}</li>", escape_html(cause));
        }
        page.push_str("</ol>\n");
    }
    page.push_str("</body></html>\n");
    reply
        .with_header(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        )
        .with_body(page)
}
