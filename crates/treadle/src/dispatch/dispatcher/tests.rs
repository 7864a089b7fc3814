//! Dispatcher state machine tests.

use std::cell::{Cell, RefCell};

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::dispatch::handler::{HandlerRegistry, HandlerResponse, MockHandlerFactory, Presenter};
use crate::dispatch::router::{MockRouter, PathRouter};
use crate::http::Method;
use crate::http::header::CONTENT_TYPE;

type HandlerFn = fn(DispatchRequest) -> Result<HandlerOutcome, DispatchError>;

fn home(_request: DispatchRequest) -> Result<HandlerOutcome, DispatchError> {
    Ok(HandlerResponse::html("home").into())
}

fn forward_home(_request: DispatchRequest) -> Result<HandlerOutcome, DispatchError> {
    Ok(HandlerOutcome::Forward(DispatchRequest::forward(
        "Home",
        Params::new(),
    )))
}

fn forward_missing(_request: DispatchRequest) -> Result<HandlerOutcome, DispatchError> {
    Ok(HandlerOutcome::Forward(DispatchRequest::forward(
        "Missing",
        Params::new(),
    )))
}

fn failing(request: DispatchRequest) -> Result<HandlerOutcome, DispatchError> {
    Err(DispatchError::handler(request.handler(), "database offline"))
}

fn error_page(request: DispatchRequest) -> Result<HandlerOutcome, DispatchError> {
    let failure = request
        .failure()
        .ok_or_else(|| DispatchError::bad_request("no failure attached"))?;
    let origin = failure
        .request
        .as_ref()
        .map(|origin| origin.handler().to_owned());
    Ok(HandlerResponse::Json(json!({
        "kind": failure.kind,
        "status": failure.status.as_u16(),
        "origin": origin,
    }))
    .into())
}

fn always(handler: HandlerFn) -> impl Fn() -> HandlerFn {
    move || handler
}

#[derive(Default)]
struct RecordingObserver {
    events: RefCell<Vec<String>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    fn push(&self, event: String) {
        self.events.borrow_mut().push(event);
    }
}

impl DispatchObserver for RecordingObserver {
    fn startup(&self) {
        self.push("startup".into());
    }

    fn request(&self, request: &DispatchRequest) {
        self.push(format!("request:{}", request.handler()));
    }

    fn handler_created(&self, name: &str) {
        self.push(format!("created:{name}"));
    }

    fn response(&self, _response: &HandlerResponse) {
        self.push("response".into());
    }

    fn error(&self, error: &DispatchError) {
        self.push(format!("error:{}", error.kind()));
    }

    fn shutdown(&self, error: Option<&DispatchError>) {
        self.push(format!("shutdown:{}", error.is_some()));
    }

    fn flush(&self) {
        self.push("flush".into());
    }
}

struct Harness {
    dispatcher: ApplicationDispatcher,
    current: CurrentRequest,
    response: SharedResponse,
    observer: Rc<RecordingObserver>,
    loop_creations: Rc<Cell<usize>>,
}

fn router() -> PathRouter {
    PathRouter::new()
        .add(Some("GET"), "/", "Home")
        .add(None, "/forward", "Forward")
        .add(None, "/loop", "Loop")
        .add(None, "/fail", "Fail")
        .add(None, "/missing", "Missing")
        .add(None, "/lost", "Lost")
        .add(None, "/debug", "Internal:Debug")
        .add(None, "/error", "Error")
}

fn build(settings: DispatcherSettings, error_handler: HandlerFn) -> Harness {
    let loop_creations = Rc::new(Cell::new(0));
    let counter = Rc::clone(&loop_creations);
    let mut registry = HandlerRegistry::new()
        .with("Home", always(home))
        .with("Forward", always(forward_home))
        .with("Lost", always(forward_missing))
        .with("Fail", always(failing))
        .with("Error", always(error_handler));
    registry.register("Loop", move || {
        counter.set(counter.get() + 1);
        forward_loop as HandlerFn
    });

    let current = CurrentRequest::new();
    let response = SharedResponse::default();
    let observer = Rc::new(RecordingObserver::default());
    let dispatcher = ApplicationDispatcher::new(
        router(),
        registry,
        current.clone(),
        response.clone(),
        settings,
    )
    .with_observer(Rc::clone(&observer) as Rc<dyn DispatchObserver>);
    Harness {
        dispatcher,
        current,
        response,
        observer,
        loop_creations,
    }
}

fn forward_loop(_request: DispatchRequest) -> Result<HandlerOutcome, DispatchError> {
    Ok(HandlerOutcome::Forward(DispatchRequest::forward(
        "Loop",
        Params::new(),
    )))
}

fn recovering() -> DispatcherSettings {
    DispatcherSettings {
        catch_exceptions: true,
        error_handler: Some("Error".into()),
        ..DispatcherSettings::default()
    }
}

#[fixture]
fn harness() -> Harness {
    build(DispatcherSettings::default(), error_page)
}

fn get(uri: &str) -> Request {
    Request::from_uri("GET", uri).expect("test request")
}

#[rstest]
fn renders_the_routed_handler(harness: Harness) {
    let reply = harness.dispatcher.run(get("/")).expect("reply");
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body_text(), "home");
    assert_eq!(reply.header(CONTENT_TYPE), Some("text/html; charset=utf-8"));
    assert!(harness.response.borrow().is_sent());
    assert_eq!(
        harness.current.try_get().map(|request| request.path().to_owned()),
        Some("/".to_owned())
    );
}

#[rstest]
fn records_http_request_details(harness: Harness) {
    let request = Request::from_uri("GET", "https://example.com/?page=2")
        .expect("request")
        .with_post("name", json!("Ada"));
    harness.dispatcher.run(request).expect("reply");

    let requests = harness.dispatcher.requests();
    assert_eq!(requests.len(), 1);
    let first = &requests[0];
    assert_eq!(first.method(), &DispatchMethod::Http(Method::GET));
    assert_eq!(first.param_str("page"), Some("2"));
    assert!(first.param(HANDLER_KEY).is_none());
    assert_eq!(first.post().get("name"), Some(&json!("Ada")));
    assert!(first.is_secured());
}

#[rstest]
fn unmatched_routes_are_not_found(harness: Harness) {
    let error = harness.dispatcher.run(get("/nowhere")).expect_err("not found");
    assert!(matches!(error, DispatchError::NotFound { ref path, .. } if path == "/nowhere"));
    assert!(harness.response.borrow().is_sent());
    assert!(harness.dispatcher.requests().is_empty());
    assert!(
        !harness
            .observer
            .events()
            .iter()
            .any(|event| event.starts_with("created:"))
    );
}

#[test]
fn unmatched_routes_never_create_a_handler() {
    let mut factory = MockHandlerFactory::new();
    factory.expect_create().times(0);
    let dispatcher = ApplicationDispatcher::new(
        router(),
        factory,
        CurrentRequest::new(),
        SharedResponse::default(),
        DispatcherSettings::default(),
    );
    let error = dispatcher.run(get("/nowhere")).expect_err("not found");
    assert_eq!(error.status(), StatusCode::NOT_FOUND);
}

#[test]
fn routes_without_a_handler_name_fail() {
    let mut router = MockRouter::new();
    router
        .expect_route()
        .returning(|_| Some(Params::from([("id".to_owned(), json!(1))])));
    let dispatcher = ApplicationDispatcher::new(
        router,
        HandlerRegistry::new(),
        CurrentRequest::new(),
        SharedResponse::default(),
        DispatcherSettings::default(),
    );
    let error = dispatcher.run(get("/")).expect_err("missing handler");
    assert!(matches!(error, DispatchError::MissingHandler { key: "handler" }));
    assert_eq!(error.status(), 500);
}

#[rstest]
fn internal_handlers_are_rejected(harness: Harness) {
    let error = harness.dispatcher.run(get("/debug")).expect_err("bad request");
    assert!(matches!(error, DispatchError::BadRequest { status, .. } if status == StatusCode::NOT_FOUND));
    assert!(harness.dispatcher.requests().is_empty());
}

#[rstest]
fn forwards_are_followed(harness: Harness) {
    let reply = harness.dispatcher.run(get("/forward")).expect("reply");
    assert_eq!(reply.body_text(), "home");
    let handlers: Vec<String> = harness
        .dispatcher
        .requests()
        .iter()
        .map(|request| request.handler().to_owned())
        .collect();
    assert_eq!(handlers, vec!["Forward", "Home"]);
    assert!(harness.dispatcher.requests()[1].is_forward());
    assert_eq!(harness.dispatcher.current_handler().as_deref(), Some("Home"));
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(10)]
fn forward_loops_are_bounded_before_handler_creation(#[case] max_loop: usize) {
    let harness = build(
        DispatcherSettings {
            max_loop,
            ..DispatcherSettings::default()
        },
        error_page,
    );
    let error = harness.dispatcher.run(get("/loop")).expect_err("loop");
    assert!(matches!(error, DispatchError::ApplicationLoop { max_loop: bound } if bound == max_loop));
    assert_eq!(harness.loop_creations.get(), max_loop);
    assert_eq!(harness.dispatcher.requests().len(), max_loop);
}

#[rstest]
fn unknown_handlers_are_masked_on_the_first_attempt(harness: Harness) {
    let error = harness.dispatcher.run(get("/missing")).expect_err("bad request");
    assert!(matches!(
        error,
        DispatchError::BadRequest { status, source: Some(_), .. } if status == StatusCode::NOT_FOUND
    ));
}

#[rstest]
fn unknown_forward_targets_are_not_masked(harness: Harness) {
    let error = harness.dispatcher.run(get("/lost")).expect_err("invalid handler");
    assert!(matches!(error, DispatchError::InvalidHandler { ref handler, .. } if handler == "Missing"));
    assert_eq!(error.status(), 500);
}

#[test]
fn the_error_handler_cannot_be_requested_directly() {
    let harness = build(recovering(), error_page);
    let reply = harness.dispatcher.run(get("/error")).expect("recovered");
    assert_eq!(reply.status, 404);
    let body: serde_json::Value = serde_json::from_slice(&reply.body).expect("json");
    assert_eq!(body["kind"], "bad-request");
    assert_eq!(body["origin"], "Error");
}

#[test]
fn handler_failures_are_recovered_by_the_error_handler() {
    let harness = build(recovering(), error_page);
    let reply = harness.dispatcher.run(get("/fail")).expect("recovered");
    assert_eq!(reply.status, 500);
    let body: serde_json::Value = serde_json::from_slice(&reply.body).expect("json");
    assert_eq!(body, json!({"kind": "handler", "status": 500, "origin": "Fail"}));
    assert_eq!(harness.dispatcher.current_handler().as_deref(), Some("Error"));
}

#[test]
fn client_error_statuses_survive_recovery() {
    let harness = build(recovering(), error_page);
    let reply = harness.dispatcher.run(get("/nowhere")).expect("recovered");
    assert_eq!(reply.status, 404);
    let body: serde_json::Value = serde_json::from_slice(&reply.body).expect("json");
    assert_eq!(body["origin"], serde_json::Value::Null);
}

#[test]
fn recovery_gets_a_fresh_loop_budget() {
    let harness = build(
        DispatcherSettings {
            max_loop: 2,
            ..recovering()
        },
        error_page,
    );
    let reply = harness.dispatcher.run(get("/loop")).expect("recovered");
    assert_eq!(reply.status, 500);
    let body: serde_json::Value = serde_json::from_slice(&reply.body).expect("json");
    assert_eq!(body["kind"], "application-loop");
}

#[test]
fn failed_recovery_returns_the_original_error() {
    let harness = build(recovering(), failing);
    let error = harness.dispatcher.run(get("/fail")).expect_err("unrecovered");
    assert!(matches!(error, DispatchError::Handler { ref handler, .. } if handler == "Fail"));
    assert_eq!(
        harness.observer.events(),
        vec![
            "startup",
            "request:Fail",
            "created:Fail",
            "error:handler",
            "request:Error",
            "created:Error",
            "error:handler",
            "shutdown:true",
        ]
    );
    assert!(harness.response.borrow().is_sent());
}

#[test]
fn recovery_is_skipped_without_catch_exceptions() {
    let harness = build(
        DispatcherSettings {
            catch_exceptions: false,
            ..recovering()
        },
        error_page,
    );
    let error = harness.dispatcher.run(get("/fail")).expect_err("unrecovered");
    assert_eq!(error.kind(), "handler");
}

#[rstest]
fn observers_follow_a_successful_run(harness: Harness) {
    harness.dispatcher.run(get("/")).expect("reply");
    assert_eq!(
        harness.observer.events(),
        vec![
            "startup",
            "request:Home",
            "created:Home",
            "response",
            "shutdown:false"
        ]
    );
}

#[test]
fn flush_notifies_observers() {
    let harness = build(DispatcherSettings::default(), error_page);
    let dispatcher = Rc::new(harness.dispatcher);
    let mut events = LifecycleEvents::new();
    dispatcher.attach(&mut events);
    events.invoke(Phase::Flush).expect("flush");
    assert_eq!(harness.observer.events(), vec!["flush"]);
}

#[rstest]
fn the_cycle_log_resets_each_run(harness: Harness) {
    harness.dispatcher.run(get("/forward")).expect("reply");
    harness.dispatcher.run(get("/")).expect("reply");
    assert_eq!(harness.dispatcher.requests().len(), 1);
}

#[test]
fn handler_factories_can_be_mocked() {
    let mut factory = MockHandlerFactory::new();
    factory
        .expect_create()
        .withf(|name| name == "Home")
        .times(1)
        .returning_st(|_| Ok(Box::new(home as HandlerFn) as Box<dyn Presenter>));
    let dispatcher = ApplicationDispatcher::new(
        router(),
        factory,
        CurrentRequest::new(),
        SharedResponse::default(),
        DispatcherSettings::default(),
    );
    let reply = dispatcher.run(get("/")).expect("reply");
    assert_eq!(reply.body_text(), "home");
}
