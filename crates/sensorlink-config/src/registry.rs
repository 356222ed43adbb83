// ── File-backed sensor registry ──
//
// Per-sensor `disabled` / `registered` flags persisted as TOML. Every
// change rewrites the whole file through a temp file and a rename, so a
// crash leaves either the old or the new contents. Worker preferences come
// from the config file and are read-only here.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sensorlink_core::{CoreError, Registry, WorkerPrefs};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
struct SensorEntry {
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    registered: bool,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RegistryFile {
    #[serde(default)]
    sensors: BTreeMap<String, SensorEntry>,
}

pub struct FileRegistry {
    path: PathBuf,
    state: Mutex<RegistryFile>,
    workers: HashMap<String, WorkerPrefs>,
}

impl FileRegistry {
    /// Open the registry at `path`. A missing file is an empty registry.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).map_err(|e| CoreError::Registry {
                message: format!("{}: {e}", path.display()),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryFile::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "sensor registry opened");

        Ok(Self {
            path,
            state: Mutex::new(state),
            workers: HashMap::new(),
        })
    }

    /// Attach worker preferences returned by `load_worker`.
    pub fn with_workers(mut self, workers: HashMap<String, WorkerPrefs>) -> Self {
        self.workers = workers;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// IDs of disabled sensors, sorted.
    pub fn disabled_sensors(&self) -> Vec<String> {
        self.state
            .lock()
            .sensors
            .iter()
            .filter(|(_, e)| e.disabled)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Clear the disabled flag for a sensor.
    pub fn enable_sensor(&self, id: &str) -> Result<(), CoreError> {
        self.update(id, |e| e.disabled = false)
    }

    /// Apply `f` to the entry for `id`. Memory only changes once the new
    /// contents are on disk.
    fn update(&self, id: &str, f: impl FnOnce(&mut SensorEntry)) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        let before = state.sensors.get(id).copied();
        let mut after = before.unwrap_or_default();
        f(&mut after);
        if Some(after) == before || (before.is_none() && after == SensorEntry::default()) {
            return Ok(());
        }

        state.sensors.insert(id.to_owned(), after);
        if let Err(e) = persist(&self.path, &state) {
            match before {
                Some(entry) => state.sensors.insert(id.to_owned(), entry),
                None => state.sensors.remove(id),
            };
            return Err(e);
        }
        Ok(())
    }
}

fn persist(path: &Path, state: &RegistryFile) -> Result<(), CoreError> {
    let text = toml::to_string_pretty(state).map_err(|e| CoreError::Registry {
        message: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl Registry for FileRegistry {
    fn is_disabled(&self, id: &str) -> bool {
        self.state.lock().sensors.get(id).is_some_and(|e| e.disabled)
    }

    fn disable_sensor(&self, id: &str) -> Result<(), CoreError> {
        self.update(id, |e| e.disabled = true)?;
        info!(sensor = %id, "sensor disabled");
        Ok(())
    }

    fn is_registered(&self, id: &str) -> bool {
        self.state
            .lock()
            .sensors
            .get(id)
            .is_some_and(|e| e.registered)
    }

    fn set_registered(&self, id: &str) -> Result<(), CoreError> {
        self.update(id, |e| e.registered = true)
    }

    fn load_worker(&self, worker_id: &str) -> Result<WorkerPrefs, CoreError> {
        Ok(self.workers.get(worker_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use super::*;

    #[test]
    fn flags_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("registry.toml");

        let reg = FileRegistry::open(&path).unwrap();
        assert!(!reg.is_disabled("fan"));
        reg.set_registered("fan").unwrap();
        reg.disable_sensor("load").unwrap();
        assert!(!path.with_extension("toml.tmp").exists());

        let reopened = FileRegistry::open(&path).unwrap();
        assert!(reopened.is_registered("fan"));
        assert!(!reopened.is_disabled("fan"));
        assert!(reopened.is_disabled("load"));
        assert_eq!(reopened.disabled_sensors(), vec!["load".to_owned()]);

        reopened.enable_sensor("load").unwrap();
        assert!(!FileRegistry::open(&path).unwrap().is_disabled("load"));
    }

    #[test]
    fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        let reg = FileRegistry::open(&path).unwrap();
        reg.set_registered("fan").unwrap();

        // A directory where the temp file goes makes every write fail.
        std::fs::create_dir(path.with_extension("toml.tmp")).unwrap();

        assert!(reg.disable_sensor("fan").is_err());
        assert!(!reg.is_disabled("fan"));
        assert!(reg.is_registered("fan"));

        assert!(reg.set_registered("pump").is_err());
        assert!(!reg.is_registered("pump"));
        assert!(reg.disabled_sensors().is_empty());

        let reopened = FileRegistry::open(&path).unwrap();
        assert!(reopened.is_registered("fan"));
        assert!(!reopened.is_disabled("fan"));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        std::fs::write(&path, "sensors = 12").unwrap();
        assert!(matches!(
            FileRegistry::open(&path),
            Err(CoreError::Registry { .. })
        ));
    }

    #[test]
    fn worker_prefs_default_when_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = WorkerPrefs {
            disabled: true,
            interval: Some(Duration::from_secs(1)),
            jitter: None,
        };
        let reg = FileRegistry::open(dir.path().join("r.toml"))
            .unwrap()
            .with_workers(HashMap::from([("scripts".to_owned(), prefs.clone())]));

        assert_eq!(reg.load_worker("scripts").unwrap(), prefs);
        assert_eq!(reg.load_worker("other").unwrap(), WorkerPrefs::default());
    }
}
