// ── Script worker ──
//
// Treats a directory of executables as one worker. Each script becomes a
// job with a Stopped/Scheduled state: the job's handle is `Some` exactly
// while it is scheduled. Scheduled runs push entities into an internal
// channel; a forwarding task owns the outward sender so the worker stream
// closes exactly once, when the worker is stopped or cancelled. A run whose
// token was cancelled from outside counts as stopped: its handles are
// cleared before any job query or transition.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::scheduler::{JobId, Scheduler};
use super::script::Script;
use crate::error::CoreError;
use crate::model::Entity;
use crate::worker::{DEFAULT_STREAM_CAPACITY, Worker};

pub const SCRIPT_WORKER_ID: &str = "scripts";

/// A script and its scheduler handle.
#[derive(Debug)]
pub struct Job {
    script: Arc<Script>,
    handle: Option<JobId>,
}

impl Job {
    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn handle(&self) -> Option<JobId> {
        self.handle
    }

    pub fn is_scheduled(&self) -> bool {
        self.handle.is_some()
    }
}

struct Running {
    cancel: CancellationToken,
    scheduler: Arc<Scheduler>,
    jobs_tx: mpsc::Sender<Entity>,
}

pub struct ScriptWorker {
    disabled: bool,
    jobs: Mutex<Vec<Job>>,
    running: Mutex<Option<Running>>,
}

impl ScriptWorker {
    /// Discover executables directly inside `dir` (not recursive).
    ///
    /// Each candidate is run once to learn its schedule; candidates that
    /// fail are logged and left out.
    pub async fn discover(dir: impl AsRef<Path>) -> Result<Self, CoreError> {
        let dir = dir.as_ref();
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut candidates = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match entry.metadata().await {
                Ok(meta) if meta.is_file() && is_executable(&meta) => candidates.push(path),
                Ok(_) => debug!(path = %path.display(), "not an executable file, skipping"),
                Err(e) => warn!(path = %path.display(), error = %e, "could not stat file"),
            }
        }
        candidates.sort();

        let mut scripts = Vec::new();
        for path in candidates {
            let Some(command_line) = path.to_str() else {
                warn!(path = %path.display(), "script path is not valid UTF-8, skipping");
                continue;
            };
            match Script::load(command_line).await {
                Ok(script) => scripts.push(script),
                Err(e) => warn!(script = %path.display(), error = %e, "could not load script"),
            }
        }

        info!(dir = %dir.display(), scripts = scripts.len(), "scripts discovered");
        Ok(Self::from_scripts(scripts))
    }

    pub fn from_scripts(scripts: Vec<Script>) -> Self {
        let jobs = scripts
            .into_iter()
            .map(|s| Job {
                script: Arc::new(s),
                handle: None,
            })
            .collect();
        Self {
            disabled: false,
            jobs: Mutex::new(jobs),
            running: Mutex::new(None),
        }
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Paths and handles of every job.
    pub fn jobs(&self) -> Vec<(PathBuf, String, Option<JobId>)> {
        self.reap_cancelled();
        self.jobs
            .lock()
            .iter()
            .map(|j| (j.script.path().to_path_buf(), j.script.schedule().to_string(), j.handle))
            .collect()
    }

    /// Paths of scheduled jobs.
    pub fn active_jobs(&self) -> Vec<PathBuf> {
        self.paths_where(true)
    }

    /// Paths of stopped jobs.
    pub fn inactive_jobs(&self) -> Vec<PathBuf> {
        self.paths_where(false)
    }

    fn paths_where(&self, scheduled: bool) -> Vec<PathBuf> {
        self.reap_cancelled();
        self.jobs
            .lock()
            .iter()
            .filter(|j| j.is_scheduled() == scheduled)
            .map(|j| j.script.path().to_path_buf())
            .collect()
    }

    /// Schedule the job for `path`.
    pub fn start_job(&self, path: &Path) -> Result<JobId, CoreError> {
        let running = self.live_run();
        let mut jobs = self.jobs.lock();

        let job = jobs
            .iter_mut()
            .find(|j| j.script.path() == path)
            .ok_or_else(|| CoreError::UnknownScript {
                path: path.to_path_buf(),
            })?;

        if job.handle.is_some() {
            return Err(CoreError::AlreadyStarted {
                path: path.to_path_buf(),
            });
        }

        let run = running.as_ref().ok_or_else(|| CoreError::SchedulingFailed {
            path: path.to_path_buf(),
            reason: "script worker is not running".into(),
        })?;

        let script = Arc::clone(&job.script);
        let tx = run.jobs_tx.clone();
        let id = run
            .scheduler
            .add(script.schedule().clone(), move || {
                let script = Arc::clone(&script);
                let tx = tx.clone();
                async move {
                    match script.execute().await {
                        Ok(entities) => {
                            for entity in entities {
                                if tx.send(entity).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(script = %script.path().display(), error = %e, "script run failed");
                        }
                    }
                }
            })
            .ok_or_else(|| CoreError::SchedulingFailed {
                path: path.to_path_buf(),
                reason: format!("schedule {} never fires", job.script.schedule()),
            })?;

        job.handle = Some(id);
        debug!(script = %path.display(), job = %id, "job scheduled");
        Ok(id)
    }

    /// Unschedule the job for `path`.
    pub fn stop_job(&self, path: &Path) -> Result<(), CoreError> {
        let running = self.live_run();
        let mut jobs = self.jobs.lock();

        let job = jobs
            .iter_mut()
            .find(|j| j.script.path() == path)
            .ok_or_else(|| CoreError::UnknownScript {
                path: path.to_path_buf(),
            })?;

        let Some(id) = job.handle else {
            return Err(CoreError::AlreadyStopped {
                path: path.to_path_buf(),
            });
        };

        if let Some(run) = running.as_ref() {
            run.scheduler.remove(id);
        }
        job.handle = None;
        debug!(script = %path.display(), job = %id, "job unscheduled");
        Ok(())
    }

    /// Run every scheduled job once, now, and collect the results.
    /// Failures are logged and contribute nothing.
    pub async fn states(&self) -> Vec<Entity> {
        self.reap_cancelled();
        let scripts: Vec<Arc<Script>> = self
            .jobs
            .lock()
            .iter()
            .filter(|j| j.is_scheduled())
            .map(|j| Arc::clone(&j.script))
            .collect();

        let results = futures_util::future::join_all(scripts.iter().map(|s| s.execute())).await;

        let mut entities = Vec::new();
        for (script, result) in scripts.iter().zip(results) {
            match result {
                Ok(mut found) => entities.append(&mut found),
                Err(e) => warn!(script = %script.path().display(), error = %e, "script run failed"),
            }
        }
        entities
    }

    fn clear_handles(&self) {
        for job in self.jobs.lock().iter_mut() {
            job.handle = None;
        }
    }

    /// Lock the run state, first dropping a run whose token has fired.
    /// Lock order is always `running`, then `jobs`.
    fn live_run(&self) -> MutexGuard<'_, Option<Running>> {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| r.cancel.is_cancelled()) {
            *running = None;
            self.clear_handles();
            debug!("script worker cancelled, jobs unscheduled");
        }
        running
    }

    fn reap_cancelled(&self) {
        drop(self.live_run());
    }
}

#[async_trait]
impl Worker for ScriptWorker {
    fn id(&self) -> &str {
        SCRIPT_WORKER_ID
    }

    fn is_disabled(&self) -> bool {
        self.disabled
    }

    async fn start(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Entity>, CoreError> {
        let (out_tx, out_rx) = mpsc::channel(DEFAULT_STREAM_CAPACITY);
        let (jobs_tx, jobs_rx) = mpsc::channel(DEFAULT_STREAM_CAPACITY);

        let token = {
            let mut running = self.live_run();
            if running.is_some() {
                return Err(CoreError::WorkerAlreadyStarted {
                    id: SCRIPT_WORKER_ID.to_owned(),
                });
            }
            let token = cancel.child_token();
            *running = Some(Running {
                cancel: token.clone(),
                scheduler: Arc::new(Scheduler::new(token.clone())),
                jobs_tx,
            });
            token
        };

        let paths: Vec<PathBuf> = self.inactive_jobs();
        for path in &paths {
            if let Err(e) = self.start_job(path) {
                warn!(script = %path.display(), error = %e, "could not schedule script");
            }
        }

        let span = info_span!("worker", id = SCRIPT_WORKER_ID);
        tokio::spawn(forward(jobs_rx, out_tx, token).instrument(span));

        Ok(out_rx)
    }

    async fn stop(&self) -> Result<(), CoreError> {
        let run = self.running.lock().take();
        match run {
            Some(run) if !run.cancel.is_cancelled() => {
                run.scheduler.shutdown();
                run.cancel.cancel();
                self.clear_handles();
                Ok(())
            }
            _ => {
                self.clear_handles();
                Err(CoreError::WorkerAlreadyStopped {
                    id: SCRIPT_WORKER_ID.to_owned(),
                })
            }
        }
    }

    async fn sensors(&self, cancel: CancellationToken) -> Result<Vec<Entity>, CoreError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(Vec::new()),
            entities = self.states() => Ok(entities),
        }
    }
}

/// Move job output onto the worker stream until cancelled.
async fn forward(
    mut jobs_rx: mpsc::Receiver<Entity>,
    out: mpsc::Sender<Entity>,
    cancel: CancellationToken,
) {
    debug!("script worker started");
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            entity = jobs_rx.recv() => {
                let Some(entity) = entity else { break };
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    sent = out.send(entity) => {
                        if sent.is_err() {
                            cancel.cancel();
                            break;
                        }
                    }
                }
            }
        }
    }
    debug!("script worker stopped");
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}
