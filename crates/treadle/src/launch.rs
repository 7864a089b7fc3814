//! Process entry point for the `treadle` binary.

use std::rc::Rc;

use thiserror::Error;
use tracing::info;

use crate::bootstrap::{BootstrapError, ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::transport::{JsonLinesTransport, Transport};
use crate::welcome;
use crate::worker::{WORKER_TARGET, WorkerError, WorkerStats};

/// Errors ending the worker process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrap or assembly failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The worker loop failed.
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Serves the welcome application over stdin/stdout until input ends.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap or the worker loop fails.
pub fn run_worker() -> Result<WorkerStats, LaunchError> {
    run_worker_with(
        &SystemConfigLoader,
        Rc::new(StructuredHealthReporter::new()),
        JsonLinesTransport::stdio(),
    )
}

/// Serves the welcome application with injected collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap or the worker loop fails.
pub fn run_worker_with<T: Transport>(
    loader: &dyn ConfigLoader,
    reporter: Rc<dyn HealthReporter>,
    transport: T,
) -> Result<WorkerStats, LaunchError> {
    let bootstrap = bootstrap_with(loader, reporter)?;
    let mut worker = welcome::install(bootstrap.into_builder()).build(transport)?;
    let stats = worker.run()?;
    info!(
        target: WORKER_TARGET,
        served = stats.served,
        rejected = stats.rejected,
        failed = stats.failed,
        "worker finished"
    );
    Ok(stats)
}
