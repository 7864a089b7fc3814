//! Behavioural tests for the request cycle of an assembled worker.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::services::Scope;
use crate::worker::WorkerError;

use super::support::{self, HealthEvent, TestWorld};

type StepResult = Result<(), String>;

#[fixture]
fn world() -> RefCell<TestWorld> {
    support::world()
}

#[given("a worker serving the welcome application")]
fn given_welcome_worker(world: &RefCell<TestWorld>) {
    let _ = world;
}

#[given("error recovery through the \"{handler}\" handler")]
fn given_error_recovery(world: &RefCell<TestWorld>, handler: String) {
    let mut world = world.borrow_mut();
    let config = world.config_mut();
    config.catch_exceptions = true;
    config.error_handler = Some(handler);
}

#[given("the middlewares \"{names}\"")]
fn given_middlewares(world: &RefCell<TestWorld>, names: String) {
    world.borrow_mut().config_mut().middlewares = names
        .split(',')
        .map(|name| name.trim().to_owned())
        .collect();
}

#[given("a front end whose replies cannot be delivered")]
fn given_failing_front_end(world: &RefCell<TestWorld>) {
    world.borrow().transport.fail_responses();
}

#[when("the client requests \"{uri}\"")]
fn when_client_requests(world: &RefCell<TestWorld>, uri: String) {
    world.borrow().request(&uri);
}

#[when("the returning client requests \"{uri}\"")]
fn when_returning_client_requests(world: &RefCell<TestWorld>, uri: String) {
    world.borrow().request_with_session(&uri);
}

#[when("the client sends a malformed frame")]
fn when_client_sends_malformed(world: &RefCell<TestWorld>) {
    world.borrow().transport.push_malformed();
}

#[when("the worker runs until input ends")]
fn when_worker_runs(world: &RefCell<TestWorld>) {
    world.borrow_mut().run();
}

#[then("reply {position} has status {status}")]
fn then_reply_status(world: &RefCell<TestWorld>, position: usize, status: u16) -> StepResult {
    let reply = world
        .borrow()
        .reply(position)
        .ok_or_else(|| format!("reply {position} missing"))?;
    if reply.status == status {
        Ok(())
    } else {
        Err(format!("expected status {status}, got {}", reply.status))
    }
}

#[then("reply {position} body contains \"{text}\"")]
fn then_reply_body(world: &RefCell<TestWorld>, position: usize, text: String) -> StepResult {
    let reply = world
        .borrow()
        .reply(position)
        .ok_or_else(|| format!("reply {position} missing"))?;
    let body = reply.body_text();
    if body.contains(&text) {
        Ok(())
    } else {
        Err(format!("body {body:?} does not contain {text:?}"))
    }
}

#[then("reply {position} counts {visits} visits")]
fn then_reply_visits(world: &RefCell<TestWorld>, position: usize, visits: u64) -> StepResult {
    let reply = world
        .borrow()
        .reply(position)
        .ok_or_else(|| format!("reply {position} missing"))?;
    let body: serde_json::Value =
        serde_json::from_slice(&reply.body).map_err(|error| error.to_string())?;
    match body["visits"].as_u64() {
        Some(counted) if counted == visits => Ok(()),
        other => Err(format!("expected {visits} visits, got {other:?}")),
    }
}

#[then("{count} flushes ran")]
fn then_flushes(world: &RefCell<TestWorld>, count: usize) {
    assert_eq!(world.borrow().flushes.get(), count);
}

#[then("the worker stopped cleanly")]
fn then_worker_stopped(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    assert!(
        matches!(world.outcome(), Some(Ok(_))),
        "worker outcome: {:?}",
        world.outcome()
    );
    let events = world.reporter.events();
    assert_eq!(events.first(), Some(&HealthEvent::BootstrapStarting));
    assert_eq!(events.last(), Some(&HealthEvent::WorkerStopped));
}

#[then("the worker failed to deliver a reply")]
fn then_worker_failed(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    assert!(
        matches!(world.outcome(), Some(Err(WorkerError::Respond { .. }))),
        "worker outcome: {:?}",
        world.outcome()
    );
    assert!(world.reporter.events().contains(&HealthEvent::TransportFailed));
}

#[then("no request-scoped service outlived its cycle")]
fn then_services_evicted(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    let services = world.context().expect("worker assembled").services();
    let tagged = services.tagged(Scope::Request);
    assert!(!tagged.is_empty(), "the welcome application registers request services");
    for name in tagged {
        assert!(!services.is_instantiated(&name), "{name} survived the cycle");
    }
}

#[then("the current request slot is empty")]
fn then_request_cleared(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    assert!(!world.context().expect("worker assembled").request().is_set());
}

#[then("bootstrap fails naming the middleware \"{name}\"")]
fn then_unknown_middleware(world: &RefCell<TestWorld>, name: String) {
    let world = world.borrow();
    let error = world.bootstrap_error().expect("bootstrap should fail");
    assert!(error.to_string().contains(&name), "{error}");
    assert!(world.outcome().is_none());
}

#[scenario(path = "tests/features/worker_cycle.feature")]
fn worker_cycle(world: RefCell<TestWorld>) {
    let _ = world;
}
