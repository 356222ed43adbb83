// ── Worker contract ──
//
// A worker produces a cancellable stream of sensor entities. Production
// runs on tasks the worker spawns itself; `start` returns as soon as they
// are running. Each stream has exactly one sender side owned by the
// worker's task, so the stream closes exactly once, when that task ends.

mod manager;
mod polling;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::model::Entity;

pub use manager::WorkerManager;
pub use polling::{PollingWorker, SensorSource};

/// Default buffer between a worker and its consumer. Small so a slow
/// consumer applies back-pressure almost immediately.
pub const DEFAULT_STREAM_CAPACITY: usize = 1;

#[async_trait]
pub trait Worker: Send + Sync {
    /// Stable identifier, unique among active workers.
    fn id(&self) -> &str;

    /// Whether this worker should be skipped by the orchestrator.
    fn is_disabled(&self) -> bool;

    /// Begin production.
    ///
    /// The returned stream closes after `cancel` fires or [`stop`](Self::stop)
    /// is called. Setup failures are returned as errors and nothing is left
    /// running.
    async fn start(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Entity>, CoreError>;

    /// Stop production and close the stream. A second call reports
    /// [`CoreError::WorkerAlreadyStopped`].
    async fn stop(&self) -> Result<(), CoreError>;

    /// One-shot snapshot of the worker's sensors, independent of the stream.
    async fn sensors(&self, cancel: CancellationToken) -> Result<Vec<Entity>, CoreError>;
}
