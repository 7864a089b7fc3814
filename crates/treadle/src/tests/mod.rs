//! Test suites for worker bootstrap and the request cycle.

mod support;
mod worker_behaviour;
