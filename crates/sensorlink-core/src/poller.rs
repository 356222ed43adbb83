// ── Jittered polling loop ──
//
// Calls an update function immediately, then again after every
// `interval + uniform(0, jitter)` wait, until cancelled. The update future
// is awaited inline so invocations never overlap; a slow update pushes the
// next tick back.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Run `update` on a jittered interval until `cancel` fires.
///
/// `update` receives the time elapsed since its previous invocation
/// (zero on the first call). Cancellation is observed while waiting and
/// while an update is in flight; in the latter case the update future is
/// dropped and `update` is not called again.
pub async fn poll_sensors<F, Fut>(
    cancel: CancellationToken,
    mut update: F,
    interval: Duration,
    jitter: Duration,
) where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut last = Instant::now();
    let mut delta = Duration::ZERO;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = update(delta) => {}
        }

        let wait = jittered(interval, jitter);
        trace!(wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX), "next poll");

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(wait) => {}
        }

        let now = Instant::now();
        delta = now.duration_since(last);
        last = now;
    }
}

/// `interval + uniform(0, jitter)`.
pub fn jittered(interval: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return interval;
    }
    let max = u64::try_from(jitter.as_nanos()).unwrap_or(u64::MAX);
    let extra = rand::thread_rng().gen_range(0..=max);
    interval.saturating_add(Duration::from_nanos(extra))
}
