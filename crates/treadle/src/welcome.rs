//! Built-in demo application served by the `treadle` binary.
//!
//! | Route              | Handler   | Shows                                |
//! |--------------------|-----------|--------------------------------------|
//! | `GET /`            | `Welcome` | HTML page, request-scoped service    |
//! | `GET /hello/<name>`| `Hello`   | route parameters, plain text         |
//! | `GET /visits`      | `Visits`  | session state across requests        |
//! | `GET /home`        | `Home`    | forward to `Welcome`                 |
//! | `GET /away`        | `Away`    | redirect                             |
//!
//! `Error` renders failures when error recovery is configured.

use std::rc::Rc;

use serde_json::json;
use time::OffsetDateTime;

use crate::BoxError;
use crate::bootstrap::{WorkerBuilder, WorkerContext};
use crate::dispatch::{
    DispatchError, DispatchRequest, HandlerOutcome, HandlerRegistry, HandlerResponse, Params,
    PathRouter,
};
use crate::http::{StatusCode, escape_html};
use crate::services::{Scope, ServiceStore};
use crate::session::SessionHandle;

/// Name of the demo error handler.
pub const ERROR_HANDLER: &str = "Error";

const REQUEST_TIME_SERVICE: &str = "request_time";
const VISITS_SECTION: &str = "welcome";

type HandlerResult = Result<HandlerOutcome, DispatchError>;

/// Routes of the demo application.
#[must_use]
pub fn router() -> PathRouter {
    PathRouter::new()
        .add(Some("GET"), "/", "Welcome")
        .add(Some("GET"), "/hello/<name>", "Hello")
        .add(Some("GET"), "/visits", "Visits")
        .add(Some("GET"), "/home", "Home")
        .add(Some("GET"), "/away", "Away")
}

/// Handlers of the demo application, bound to the worker's shared handles.
#[must_use]
pub fn handlers(context: &WorkerContext) -> HandlerRegistry {
    register_services(context.services());

    let services = Rc::clone(context.services());
    let session = Rc::clone(context.session());
    HandlerRegistry::new()
        .with("Welcome", move || {
            let services = Rc::clone(&services);
            move |_request: DispatchRequest| -> HandlerResult { welcome(&services) }
        })
        .with("Hello", || hello)
        .with("Visits", move || {
            let session = Rc::clone(&session);
            move |_request: DispatchRequest| -> HandlerResult { visits(&session) }
        })
        .with("Home", || home)
        .with("Away", || away)
        .with(ERROR_HANDLER, || error_page)
}

/// Installs the demo routes and handlers on `builder`.
#[must_use]
pub fn install(builder: WorkerBuilder) -> WorkerBuilder {
    let handlers = handlers(builder.context());
    builder.router(router()).handlers(handlers)
}

fn register_services(services: &ServiceStore) {
    services.register(REQUEST_TIME_SERVICE, Scope::Request, |_store| {
        Ok::<_, BoxError>(OffsetDateTime::now_utc())
    });
}

fn welcome(services: &ServiceStore) -> HandlerResult {
    let served_at = services
        .get::<OffsetDateTime>(REQUEST_TIME_SERVICE)
        .map_err(|error| DispatchError::handler("Welcome", error))?;
    let page = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Treadle</title></head>\n\
         <body><h1>Welcome to Treadle</h1><p>Served at {}.</p></body></html>\n",
        escape_html(&served_at.to_string())
    );
    Ok(HandlerResponse::html(page).into())
}

fn hello(request: DispatchRequest) -> HandlerResult {
    let name = request
        .param_str("name")
        .ok_or_else(|| DispatchError::bad_request_with_status(StatusCode::BAD_REQUEST, "missing name"))?;
    Ok(HandlerResponse::text(format!("Hello, {name}!"), "text/plain; charset=utf-8").into())
}

fn visits(session: &SessionHandle) -> HandlerResult {
    let mut session = session
        .try_borrow_mut()
        .map_err(|error| DispatchError::handler("Visits", error))?;
    let previous = session
        .get(VISITS_SECTION, "visits")
        .map_err(|error| DispatchError::handler("Visits", error))?
        .and_then(|value| value.as_u64())
        .unwrap_or(0);
    let visits = previous + 1;
    session
        .set(VISITS_SECTION, "visits", json!(visits))
        .map_err(|error| DispatchError::handler("Visits", error))?;
    Ok(HandlerResponse::Json(json!({ "visits": visits })).into())
}

fn home(_request: DispatchRequest) -> HandlerResult {
    Ok(HandlerOutcome::Forward(DispatchRequest::forward(
        "Welcome",
        Params::new(),
    )))
}

fn away(_request: DispatchRequest) -> HandlerResult {
    Ok(HandlerResponse::redirect("https://example.com/").into())
}

fn error_page(request: DispatchRequest) -> HandlerResult {
    let failure = request
        .failure()
        .ok_or_else(|| DispatchError::bad_request("no failure to render"))?;
    let title = if failure.status == StatusCode::NOT_FOUND {
        "Not Found"
    } else if failure.status.is_client_error() {
        "Bad Request"
    } else {
        "Internal Server Error"
    };
    Ok(HandlerResponse::Json(json!({ "error": title, "status": failure.status.as_u16() })).into())
}
