// ── Sensor tracker ──
//
// Last-known-state registry keyed by sensor ID. A single mutex guards
// every read, write and iteration; the map itself is optional so that a
// reset tracker rejects writes until it is reinitialised.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::error::CoreError;
use crate::model::Entity;

/// Concurrency-safe map of sensor ID to the most recent [`Entity`].
pub struct Tracker {
    sensors: Mutex<Option<HashMap<String, Arc<Entity>>>>,
    version: watch::Sender<u64>,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker {
    /// Create an initialised, empty tracker.
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            sensors: Mutex::new(Some(HashMap::new())),
            version,
        }
    }

    /// Latest entity recorded under `id`.
    pub fn get(&self, id: &str) -> Result<Arc<Entity>, CoreError> {
        self.sensors
            .lock()
            .as_ref()
            .and_then(|map| map.get(id).cloned())
            .ok_or_else(|| CoreError::SensorNotFound { id: id.to_owned() })
    }

    /// Record `entity`, replacing any previous value for its ID.
    pub fn add(&self, entity: Entity) -> Result<(), CoreError> {
        {
            let mut guard = self.sensors.lock();
            let map = guard.as_mut().ok_or(CoreError::TrackerNotReady)?;
            map.insert(entity.id().to_owned(), Arc::new(entity));
        }
        self.bump();
        Ok(())
    }

    /// All tracked sensor IDs, sorted.
    pub fn sensor_list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sensors
            .lock()
            .as_ref()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Number of tracked sensors (zero when reset).
    pub fn len(&self) -> usize {
        self.sensors.lock().as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the tracker accepts writes.
    pub fn is_ready(&self) -> bool {
        self.sensors.lock().is_some()
    }

    /// Discard every entry. Writes fail until [`init`](Self::init) is called.
    pub fn reset(&self) {
        let was_ready = self.sensors.lock().take().is_some();
        if was_ready {
            debug!("sensor tracker reset");
            self.bump();
        }
    }

    /// Reinitialise a reset tracker. No-op if already initialised.
    pub fn init(&self) {
        let mut guard = self.sensors.lock();
        if guard.is_none() {
            *guard = Some(HashMap::new());
        }
    }

    /// Subscribe to change notifications. The value increments after
    /// every successful `add` and every effective `reset`.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::StateValue;

    fn reading(id: &str, value: i64) -> Entity {
        Entity::builder(id, id).value(value).build().unwrap()
    }

    #[test]
    fn get_returns_last_write() {
        let tracker = Tracker::new();
        for v in 0..10 {
            tracker.add(reading("cpu", v)).unwrap();
        }
        assert_eq!(tracker.get("cpu").unwrap().value(), Some(&StateValue::Int(9)));
    }

    #[test]
    fn missing_sensor_is_not_found() {
        let tracker = Tracker::new();
        assert!(matches!(
            tracker.get("nope"),
            Err(CoreError::SensorNotFound { id }) if id == "nope"
        ));
    }

    #[test]
    fn sensor_list_sorted_and_unique() {
        let tracker = Tracker::new();
        for id in ["zeta", "alpha", "mid", "alpha", "beta", "zeta"] {
            tracker.add(reading(id, 1)).unwrap();
        }
        assert_eq!(tracker.sensor_list(), vec!["alpha", "beta", "mid", "zeta"]);
    }

    #[test]
    fn empty_list_when_nothing_tracked() {
        let tracker = Tracker::new();
        assert!(tracker.sensor_list().is_empty());
        tracker.reset();
        assert!(tracker.sensor_list().is_empty());
    }

    #[test]
    fn add_after_reset_is_not_ready() {
        let tracker = Tracker::new();
        tracker.add(reading("a", 1)).unwrap();
        tracker.reset();
        tracker.reset();

        assert!(matches!(
            tracker.add(reading("b", 2)),
            Err(CoreError::TrackerNotReady)
        ));
        assert_eq!(tracker.len(), 0);
        assert!(!tracker.is_ready());

        tracker.init();
        tracker.add(reading("b", 2)).unwrap();
        assert_eq!(tracker.sensor_list(), vec!["b"]);
    }

    #[test]
    fn version_bumps_on_change() {
        let tracker = Tracker::new();
        let rx = tracker.subscribe();
        tracker.add(reading("a", 1)).unwrap();
        tracker.add(reading("a", 2)).unwrap();
        assert_eq!(*rx.borrow(), 2);
        tracker.reset();
        assert_eq!(*rx.borrow(), 3);
        // Already reset: no change.
        tracker.reset();
        assert_eq!(*rx.borrow(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_and_readers() {
        let tracker = Arc::new(Tracker::new());
        let mut handles = Vec::new();

        for w in 0..8 {
            let t = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                for v in 0..100 {
                    t.add(reading(&format!("s{w}"), v)).unwrap();
                    let list = t.sensor_list();
                    let mut sorted = list.clone();
                    sorted.sort();
                    assert_eq!(list, sorted);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(tracker.len(), 8);
        for w in 0..8 {
            assert_eq!(
                tracker.get(&format!("s{w}")).unwrap().value(),
                Some(&StateValue::Int(99))
            );
        }
    }
}
