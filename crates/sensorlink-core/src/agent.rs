// ── Agent ──
//
// Wires workers, the fan-in stage, the dispatcher and the tracker into one
// running service. One dispatch task drains the merged stream in arrival
// order; per-worker ordering is preserved because each worker stream is
// merged as-is.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sensorlink_api::ApiClient;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::dispatch::Dispatcher;
use crate::error::CoreError;
use crate::model::Entity;
use crate::scripts::{SCRIPT_WORKER_ID, ScriptWorker};
use crate::sensors::ExternalIp;
use crate::sensors::external_ip::EXTERNAL_IP_WORKER_ID;
use crate::store::{Registry, Tracker};
use crate::worker::{Worker, WorkerManager};

/// How long [`Agent::shutdown`] waits for worker streams to close.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The main entry point for embedders.
///
/// Cheaply cloneable via `Arc<AgentInner>`.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    config: AgentConfig,
    tracker: Arc<Tracker>,
    registry: Arc<dyn Registry>,
    dispatcher: Arc<Dispatcher>,
    manager: WorkerManager,
    merged: Mutex<Option<mpsc::Receiver<Entity>>>,
    cancel: CancellationToken,
    task_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Agent {
    /// Create an agent. Nothing runs until [`start`](Self::start).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: AgentConfig, api: Arc<dyn ApiClient>, registry: Arc<dyn Registry>) -> Self {
        let cancel = CancellationToken::new();
        let tracker = Arc::new(Tracker::new());
        let dispatcher = Arc::new(Dispatcher::new(
            api,
            Arc::clone(&registry),
            Arc::clone(&tracker),
            config.server_url.clone(),
        ));
        let (manager, merged) =
            WorkerManager::new(Arc::clone(&registry), cancel.clone(), config.channel_capacity);

        Self {
            inner: Arc::new(AgentInner {
                config,
                tracker,
                registry,
                dispatcher,
                manager,
                merged: Mutex::new(Some(merged)),
                cancel,
                task_handles: tokio::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.inner.tracker
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    pub fn manager(&self) -> &WorkerManager {
        &self.inner.manager
    }

    /// Subscribe to tracker changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.tracker.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start `workers` and, on first call, the dispatch task. Returns the
    /// number of workers started; disabled and failing workers are omitted.
    pub async fn start(&self, workers: Vec<Arc<dyn Worker>>) -> usize {
        let merged = self.inner.merged.lock().take();
        if let Some(rx) = merged {
            let handle = tokio::spawn(dispatch_task(
                Arc::clone(&self.inner.dispatcher),
                rx,
                self.inner.cancel.clone(),
            ));
            self.inner.task_handles.lock().await.push(handle);
        }

        let started = self.inner.manager.start_workers(workers).await;
        info!(started, "agent running");
        started
    }

    /// Add one worker to the running agent.
    pub async fn add_worker(&self, worker: Arc<dyn Worker>) -> Result<(), CoreError> {
        self.inner.manager.start_worker(worker).await
    }

    /// Stop the named workers.
    pub async fn stop_workers(&self, ids: &[&str]) -> Result<(), CoreError> {
        self.inner.manager.stop_workers(ids).await
    }

    /// Stop every worker, cancel background tasks and wait for them. Worker
    /// streams get [`SHUTDOWN_GRACE`] to close.
    pub async fn shutdown(&self) {
        self.inner.manager.shutdown(SHUTDOWN_GRACE).await;
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("agent stopped");
    }

    /// Clear all tracked state, e.g. after re-registering with a new
    /// server. The tracker accepts writes again immediately.
    pub fn reset(&self) {
        self.inner.tracker.reset();
        self.inner.tracker.init();
    }

    /// Pull a snapshot from every active worker and dispatch it now.
    /// Returns the number of entities dispatched successfully.
    pub async fn refresh(&self) -> usize {
        let mut sent = 0;
        for worker in self.inner.manager.active_workers() {
            let entities = match worker.sensors(self.inner.cancel.child_token()).await {
                Ok(entities) => entities,
                Err(e) => {
                    warn!(worker = %worker.id(), error = %e, "snapshot failed");
                    continue;
                }
            };
            for entity in entities {
                let id = entity.id().to_owned();
                match self.inner.dispatcher.dispatch(entity).await {
                    Ok(_) => sent += 1,
                    Err(e) => warn!(sensor = %id, error = %e, "could not dispatch sensor"),
                }
            }
        }
        sent
    }

    /// Build the built-in workers enabled by configuration, applying stored
    /// worker preferences.
    pub async fn default_workers(&self) -> Vec<Arc<dyn Worker>> {
        let mut workers: Vec<Arc<dyn Worker>> = Vec::new();
        let config = &self.inner.config;

        if let Some(dir) = &config.scripts_dir {
            if dir.is_dir() {
                let disabled = self.prefs_disabled(SCRIPT_WORKER_ID);
                match ScriptWorker::discover(dir).await {
                    Ok(worker) => workers.push(Arc::new(worker.with_disabled(disabled))),
                    Err(e) => warn!(dir = %dir.display(), error = %e, "script discovery failed"),
                }
            } else {
                debug!(dir = %dir.display(), "no scripts directory");
            }
        }

        if let Some(ip) = &config.external_ip {
            match ExternalIp::worker(ip.clone()) {
                Ok(worker) => {
                    let worker = match self.inner.registry.load_worker(EXTERNAL_IP_WORKER_ID) {
                        Ok(prefs) => worker.with_prefs(&prefs),
                        Err(e) => {
                            warn!(worker = EXTERNAL_IP_WORKER_ID, error = %e, "could not load worker preferences");
                            worker
                        }
                    };
                    workers.push(Arc::new(worker));
                }
                Err(e) => warn!(worker = EXTERNAL_IP_WORKER_ID, error = %e, "could not create worker"),
            }
        }

        workers
    }

    fn prefs_disabled(&self, id: &str) -> bool {
        self.inner
            .registry
            .load_worker(id)
            .map(|p| p.disabled)
            .unwrap_or(false)
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Dispatch merged entities one at a time until cancelled or the merged
/// stream ends.
async fn dispatch_task(
    dispatcher: Arc<Dispatcher>,
    mut rx: mpsc::Receiver<Entity>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            entity = rx.recv() => {
                let Some(entity) = entity else { break };
                let id = entity.id().to_owned();
                if let Err(e) = dispatcher.dispatch(entity).await {
                    warn!(sensor = %id, error = %e, "could not dispatch sensor");
                }
            }
        }
    }
    debug!("dispatch task stopped");
}
