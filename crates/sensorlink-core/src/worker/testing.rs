// Worker doubles shared by the core tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Worker;
use crate::error::CoreError;
use crate::model::Entity;

/// Sends an increasing reading every 50ms until cancelled. `finished`
/// turns true when the producing task has returned, just before it
/// drops its sender.
pub(crate) struct Ticker {
    id: &'static str,
    finished: Arc<AtomicBool>,
    running: Mutex<Option<CancellationToken>>,
}

impl Ticker {
    pub(crate) fn new(id: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            finished: Arc::new(AtomicBool::new(false)),
            running: Mutex::new(None),
        })
    }

    pub(crate) fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for Ticker {
    fn id(&self) -> &str {
        self.id
    }

    fn is_disabled(&self) -> bool {
        false
    }

    async fn start(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Entity>, CoreError> {
        let token = cancel.child_token();
        *self.running.lock() = Some(token.clone());
        self.finished.store(false, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(1);
        let id = self.id;
        let finished = Arc::clone(&self.finished);
        tokio::spawn(async move {
            let mut n = 0_i64;
            loop {
                let Ok(entity) = Entity::builder(id, id).value(n).build() else {
                    break;
                };
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    sent = tx.send(entity) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
                n += 1;
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(Duration::from_millis(50)) => {}
                }
            }
            finished.store(true, Ordering::SeqCst);
            drop(tx);
        });

        Ok(rx)
    }

    async fn stop(&self) -> Result<(), CoreError> {
        match self.running.lock().take() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                Ok(())
            }
            _ => Err(CoreError::WorkerAlreadyStopped {
                id: self.id.to_owned(),
            }),
        }
    }

    async fn sensors(&self, _cancel: CancellationToken) -> Result<Vec<Entity>, CoreError> {
        Ok(Vec::new())
    }
}

/// Returns a stream that is already closed.
pub(crate) struct Oneshot;

#[async_trait]
impl Worker for Oneshot {
    fn id(&self) -> &str {
        "oneshot"
    }

    fn is_disabled(&self) -> bool {
        false
    }

    async fn start(&self, _cancel: CancellationToken) -> Result<mpsc::Receiver<Entity>, CoreError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn stop(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn sensors(&self, _cancel: CancellationToken) -> Result<Vec<Entity>, CoreError> {
        Ok(Vec::new())
    }
}
