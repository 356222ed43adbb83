// ── Job scheduler ──
//
// Runs async jobs on a `Schedule`, one task per job. Every job gets a
// non-zero `JobId`; removing a job cancels its task. A job's runs never
// overlap: the next fire time is computed after the previous run ends.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::schedule::Schedule;

/// Scheduler-assigned job handle. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(NonZeroU64);

impl JobId {
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Scheduler {
    next_id: AtomicU64,
    jobs: Mutex<HashMap<JobId, CancellationToken>>,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Jobs stop when `cancel` fires.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            jobs: Mutex::new(HashMap::new()),
            cancel,
        }
    }

    /// Schedule `job`. Returns `None` if the schedule never fires or the
    /// scheduler has been shut down.
    pub fn add<F, Fut>(&self, schedule: Schedule, job: F) -> Option<JobId>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return None;
        }
        schedule.until_next(Utc::now())?;

        let id = JobId(NonZeroU64::MIN.saturating_add(self.next_id.fetch_add(1, Ordering::Relaxed)));
        let token = self.cancel.child_token();
        self.jobs.lock().insert(id, token.clone());

        tokio::spawn(async move {
            loop {
                let Some(wait) = schedule.until_next(Utc::now()) else {
                    debug!(job = %id, "schedule exhausted");
                    break;
                };
                trace!(job = %id, wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX), "job waiting");

                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(wait) => {}
                }
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    () = job() => {}
                }
            }
        });

        Some(id)
    }

    /// Cancel a job. Returns `false` if the ID is unknown.
    pub fn remove(&self, id: JobId) -> bool {
        match self.jobs.lock().remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every job.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.jobs.lock().clear();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for token in self.jobs.get_mut().values() {
            token.cancel();
        }
    }
}
