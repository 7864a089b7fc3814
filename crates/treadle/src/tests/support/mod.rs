//! Test harness utilities for the worker behavioural suites.

mod config_loader;
mod reporter;
mod transport;
mod world;

pub use config_loader::FailingConfigLoader;
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use transport::ScriptedTransport;
pub use world::{TestWorld, world};
