// ── Timer-driven worker ──
//
// Adapts any pull-based `SensorSource` into a `Worker` by driving it with
// the jittered poller. Poll failures are logged and the loop carries on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use super::{DEFAULT_STREAM_CAPACITY, Worker};
use crate::error::CoreError;
use crate::model::Entity;
use crate::poller::poll_sensors;
use crate::store::WorkerPrefs;

/// A source of sensor readings sampled on a timer.
#[async_trait]
pub trait SensorSource: Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Base polling interval.
    fn interval(&self) -> Duration;

    /// Upper bound of the random delay added to each interval.
    fn jitter(&self) -> Duration {
        Duration::ZERO
    }

    /// Take one reading. `delta` is the time since the previous poll
    /// (zero for the first and for on-demand snapshots).
    async fn poll(&self, delta: Duration) -> Result<Vec<Entity>, CoreError>;
}

/// [`Worker`] that polls a [`SensorSource`].
pub struct PollingWorker<S> {
    source: Arc<S>,
    disabled: bool,
    interval: Duration,
    jitter: Duration,
    capacity: usize,
    running: Mutex<Option<CancellationToken>>,
}

impl<S: SensorSource> PollingWorker<S> {
    pub fn new(source: S) -> Self {
        let interval = source.interval();
        let jitter = source.jitter();
        Self {
            source: Arc::new(source),
            disabled: false,
            interval,
            jitter,
            capacity: DEFAULT_STREAM_CAPACITY,
            running: Mutex::new(None),
        }
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Apply stored preferences: disabled flag and interval/jitter overrides.
    pub fn with_prefs(mut self, prefs: &WorkerPrefs) -> Self {
        self.disabled = prefs.disabled;
        if let Some(interval) = prefs.interval {
            self.interval = interval;
        }
        if let Some(jitter) = prefs.jitter {
            self.jitter = jitter;
        }
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }
}

#[async_trait]
impl<S: SensorSource> Worker for PollingWorker<S> {
    fn id(&self) -> &str {
        self.source.id()
    }

    fn is_disabled(&self) -> bool {
        self.disabled
    }

    async fn start(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Entity>, CoreError> {
        let token = {
            let mut running = self.running.lock();
            if running.as_ref().is_some_and(|t| !t.is_cancelled()) {
                return Err(CoreError::WorkerAlreadyStarted {
                    id: self.id().to_owned(),
                });
            }
            let token = cancel.child_token();
            *running = Some(token.clone());
            token
        };

        let (tx, rx) = mpsc::channel(self.capacity);
        let span = info_span!("worker", id = %self.id());
        tokio::spawn(
            produce(
                Arc::clone(&self.source),
                tx,
                token,
                self.interval,
                self.jitter,
            )
            .instrument(span),
        );

        Ok(rx)
    }

    async fn stop(&self) -> Result<(), CoreError> {
        match self.running.lock().take() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                Ok(())
            }
            _ => Err(CoreError::WorkerAlreadyStopped {
                id: self.id().to_owned(),
            }),
        }
    }

    async fn sensors(&self, cancel: CancellationToken) -> Result<Vec<Entity>, CoreError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(Vec::new()),
            result = self.source.poll(Duration::ZERO) => result,
        }
    }
}

async fn produce<S: SensorSource>(
    source: Arc<S>,
    tx: mpsc::Sender<Entity>,
    cancel: CancellationToken,
    interval: Duration,
    jitter: Duration,
) {
    debug!("worker started");

    poll_sensors(
        cancel.clone(),
        |delta| {
            let source = Arc::clone(&source);
            let tx = tx.clone();
            let cancel = cancel.clone();
            async move {
                match source.poll(delta).await {
                    Ok(entities) => {
                        for entity in entities {
                            if tx.send(entity).await.is_err() {
                                // Consumer is gone; nothing left to produce for.
                                cancel.cancel();
                                break;
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "sensor poll failed"),
                }
            }
        },
        interval,
        jitter,
    )
    .await;

    debug!("worker stopped");
}
