// ── Sensor registry ──
//
// Per-sensor control state (disabled, registered) and per-worker
// preferences. Core only calls through the `Registry` trait; storage is
// supplied by the embedding application. `MemoryRegistry` backs tests and
// ephemeral runs.

use std::time::Duration;

use dashmap::DashMap;
use tracing::info;

use crate::error::CoreError;

/// Preferences loaded for a single worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerPrefs {
    pub disabled: bool,
    /// Overrides the worker's own polling interval.
    pub interval: Option<Duration>,
    /// Overrides the worker's own jitter.
    pub jitter: Option<Duration>,
}

/// Local control state for sensors and workers.
pub trait Registry: Send + Sync {
    /// Whether the sensor has been disabled (locally or by the remote).
    fn is_disabled(&self, id: &str) -> bool;

    /// Mark the sensor disabled.
    fn disable_sensor(&self, id: &str) -> Result<(), CoreError>;

    /// Whether the sensor has been registered with the remote.
    fn is_registered(&self, id: &str) -> bool;

    /// Record a successful registration.
    fn set_registered(&self, id: &str) -> Result<(), CoreError>;

    /// Preferences for a worker. Unknown workers get defaults.
    fn load_worker(&self, worker_id: &str) -> Result<WorkerPrefs, CoreError> {
        let _ = worker_id;
        Ok(WorkerPrefs::default())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SensorFlags {
    disabled: bool,
    registered: bool,
}

/// In-memory [`Registry`].
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    sensors: DashMap<String, SensorFlags>,
    workers: DashMap<String, WorkerPrefs>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set preferences returned for `worker_id`.
    pub fn set_worker(&self, worker_id: impl Into<String>, prefs: WorkerPrefs) {
        self.workers.insert(worker_id.into(), prefs);
    }

    /// IDs of every disabled sensor, sorted.
    pub fn disabled_sensors(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sensors
            .iter()
            .filter(|e| e.value().disabled)
            .map(|e| e.key().clone())
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl Registry for MemoryRegistry {
    fn is_disabled(&self, id: &str) -> bool {
        self.sensors.get(id).is_some_and(|f| f.disabled)
    }

    fn disable_sensor(&self, id: &str) -> Result<(), CoreError> {
        self.sensors.entry(id.to_owned()).or_default().disabled = true;
        info!(sensor = %id, "sensor disabled");
        Ok(())
    }

    fn is_registered(&self, id: &str) -> bool {
        self.sensors.get(id).is_some_and(|f| f.registered)
    }

    fn set_registered(&self, id: &str) -> Result<(), CoreError> {
        self.sensors.entry(id.to_owned()).or_default().registered = true;
        Ok(())
    }

    fn load_worker(&self, worker_id: &str) -> Result<WorkerPrefs, CoreError> {
        Ok(self
            .workers
            .get(worker_id)
            .map(|p| p.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_independent() {
        let reg = MemoryRegistry::new();
        assert!(!reg.is_disabled("a"));
        assert!(!reg.is_registered("a"));

        reg.set_registered("a").unwrap();
        assert!(reg.is_registered("a"));
        assert!(!reg.is_disabled("a"));

        reg.disable_sensor("a").unwrap();
        reg.disable_sensor("c").unwrap();
        assert!(reg.is_disabled("a"));
        assert!(reg.is_registered("a"));
        assert_eq!(reg.disabled_sensors(), vec!["a", "c"]);
    }

    #[test]
    fn worker_prefs_default_when_unknown() {
        let reg = MemoryRegistry::new();
        assert_eq!(reg.load_worker("x").unwrap(), WorkerPrefs::default());

        reg.set_worker(
            "x",
            WorkerPrefs {
                disabled: true,
                ..WorkerPrefs::default()
            },
        );
        assert!(reg.load_worker("x").unwrap().disabled);
    }
}
