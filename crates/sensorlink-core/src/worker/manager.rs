// ── Worker fan-in ──
//
// Starts workers, tracks the active set by ID, and merges every worker
// stream into one output channel. Workers can be added to, and stopped
// within, a running merge. A worker's slot disappears when its stream
// closes. On cancellation the merge keeps draining until every worker
// stream has ended, so once the merge task finishes no worker task is
// left producing. The output closes after that, or once the manager is
// dropped and every remaining worker stream has ended.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt, StreamMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Worker;
use crate::error::CoreError;
use crate::model::Entity;
use crate::store::Registry;

/// Identifies one attachment of a worker. `seq` tells a restarted worker
/// apart from the stream of its previous run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    id: String,
    seq: u64,
}

struct Slot {
    seq: u64,
    worker: Arc<dyn Worker>,
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

/// A worker stream followed by a single `None` marking its end.
type SlotStream = Pin<Box<dyn Stream<Item = Option<Entity>> + Send>>;

struct Attach {
    key: SlotKey,
    rx: mpsc::Receiver<Entity>,
}

/// Orchestrates a dynamic set of [`Worker`]s.
pub struct WorkerManager {
    registry: Arc<dyn Registry>,
    cancel: CancellationToken,
    active: Slots,
    next_seq: AtomicU64,
    attach: mpsc::UnboundedSender<Attach>,
    merge_task: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerManager {
    /// Create a manager and spawn its merge task.
    ///
    /// Returns the manager and the merged output stream. Must be called
    /// from within a Tokio runtime.
    pub fn new(
        registry: Arc<dyn Registry>,
        cancel: CancellationToken,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Entity>) {
        let (attach, attach_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(capacity.max(1));
        let active: Slots = Arc::new(Mutex::new(HashMap::new()));

        let merge_task = tokio::spawn(merge(
            attach_rx,
            out_tx,
            cancel.clone(),
            Arc::clone(&active),
        ));

        let manager = Self {
            registry,
            cancel,
            active,
            next_seq: AtomicU64::new(0),
            attach,
            merge_task: Mutex::new(Some(merge_task)),
        };
        (manager, out_rx)
    }

    /// Start one worker and attach its stream to the merged output.
    ///
    /// Disabled workers (by their own flag or by stored preferences) are
    /// rejected with [`CoreError::WorkerDisabled`].
    pub async fn start_worker(&self, worker: Arc<dyn Worker>) -> Result<(), CoreError> {
        let id = worker.id().to_owned();

        if worker.is_disabled() || self.prefs_disabled(&id) {
            return Err(CoreError::WorkerDisabled { id });
        }
        if self.active.lock().contains_key(&id) {
            return Err(CoreError::WorkerAlreadyStarted { id });
        }

        let rx = worker
            .start(self.cancel.child_token())
            .await
            .map_err(|e| CoreError::WorkerStart {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        // The slot must exist before the merge can observe the stream end.
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let clash = {
            let mut active = self.active.lock();
            if active.contains_key(&id) {
                true
            } else {
                active.insert(
                    id.clone(),
                    Slot {
                        seq,
                        worker: Arc::clone(&worker),
                    },
                );
                false
            }
        };
        if clash {
            let _ = worker.stop().await;
            return Err(CoreError::WorkerAlreadyStarted { id });
        }

        let key = SlotKey { id: id.clone(), seq };
        if let Err(mpsc::error::SendError(attach)) = self.attach.send(Attach { key, rx }) {
            // Merge task is gone (cancelled); don't leave the worker running.
            release(&self.active, &attach.key);
            let _ = worker.stop().await;
            return Err(CoreError::WorkerStart {
                id,
                reason: "worker manager is shut down".into(),
            });
        }

        info!(worker = %id, "worker started");
        Ok(())
    }

    /// Start every worker, skipping disabled ones and omitting any whose
    /// start fails. Returns the number started.
    pub async fn start_workers(&self, workers: Vec<Arc<dyn Worker>>) -> usize {
        let mut started = 0;
        for worker in workers {
            let id = worker.id().to_owned();
            match self.start_worker(worker).await {
                Ok(()) => started += 1,
                Err(CoreError::WorkerDisabled { .. }) => {
                    info!(worker = %id, "worker disabled, not starting");
                }
                Err(e) => warn!(worker = %id, error = %e, "could not start worker"),
            }
        }
        started
    }

    /// Stop the named workers. Unknown IDs are logged and skipped.
    pub async fn stop_workers(&self, ids: &[&str]) -> Result<(), CoreError> {
        let mut first_err = None;
        for id in ids {
            let slot = self.active.lock().remove(*id);
            let Some(slot) = slot else {
                warn!(worker = %id, "no such active worker");
                continue;
            };
            if let Err(e) = slot.worker.stop().await {
                warn!(worker = %id, error = %e, "could not stop worker");
                first_err.get_or_insert(e);
            } else {
                debug!(worker = %id, "worker stopped");
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Stop every active worker.
    pub async fn stop_all_workers(&self) -> Result<(), CoreError> {
        let ids = self.active_ids();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        self.stop_workers(&refs).await
    }

    /// Stop every worker, cancel the merge and wait until every worker
    /// stream has closed. After `grace` the merge task is aborted.
    pub async fn shutdown(&self, grace: Duration) {
        if let Err(e) = self.stop_all_workers().await {
            debug!(error = %e, "error while stopping workers");
        }
        self.cancel.cancel();

        let task = self.merge_task.lock().take();
        let Some(mut task) = task else { return };
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            warn!(grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX), "worker streams still open, aborting merge");
            task.abort();
            self.active.lock().clear();
        }
    }

    /// IDs of the active workers, sorted.
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.lock().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// The active workers.
    pub fn active_workers(&self) -> Vec<Arc<dyn Worker>> {
        self.active
            .lock()
            .values()
            .map(|slot| Arc::clone(&slot.worker))
            .collect()
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn Worker>, CoreError> {
        self.active
            .lock()
            .get(id)
            .map(|slot| Arc::clone(&slot.worker))
            .ok_or_else(|| CoreError::WorkerNotFound { id: id.to_owned() })
    }

    fn prefs_disabled(&self, id: &str) -> bool {
        match self.registry.load_worker(id) {
            Ok(prefs) => prefs.disabled,
            Err(e) => {
                warn!(worker = %id, error = %e, "could not load worker preferences");
                false
            }
        }
    }
}

/// Drop the slot for `key` unless the worker was restarted since.
fn release(slots: &Mutex<HashMap<String, Slot>>, key: &SlotKey) -> bool {
    let mut slots = slots.lock();
    if slots.get(&key.id).is_some_and(|slot| slot.seq == key.seq) {
        slots.remove(&key.id);
        true
    } else {
        false
    }
}

fn slot_stream(rx: mpsc::Receiver<Entity>) -> SlotStream {
    Box::pin(
        ReceiverStream::new(rx)
            .map(Some)
            .chain(tokio_stream::once(None)),
    )
}

/// Multiplex attached worker streams into `out`.
async fn merge(
    mut attach: mpsc::UnboundedReceiver<Attach>,
    out: mpsc::Sender<Entity>,
    cancel: CancellationToken,
    slots: Slots,
) {
    let mut streams: StreamMap<SlotKey, SlotStream> = StreamMap::new();
    let mut accepting = true;

    loop {
        if !accepting && streams.is_empty() {
            break;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            msg = attach.recv(), if accepting => match msg {
                Some(Attach { key, rx }) => {
                    streams.insert(key, slot_stream(rx));
                }
                None => accepting = false,
            },
            next = streams.next(), if !streams.is_empty() => match next {
                Some((key, Some(entity))) => {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        sent = out.send(entity) => {
                            if sent.is_err() {
                                debug!(worker = %key.id, "merged stream consumer dropped");
                                break;
                            }
                        }
                    }
                }
                Some((key, None)) => {
                    if release(&slots, &key) {
                        debug!(worker = %key.id, "worker stream closed");
                    }
                }
                None => {}
            },
        }
    }

    if cancel.is_cancelled() {
        // Every worker token is a child of `cancel`: wait for the streams
        // to end so no worker task outlives the merge.
        attach.close();
        while let Ok(Attach { key, rx }) = attach.try_recv() {
            streams.insert(key, slot_stream(rx));
        }
        while streams.next().await.is_some() {}
    }

    slots.lock().clear();
    debug!(remaining = streams.len(), "worker merge exiting");
    drop(out);
}
