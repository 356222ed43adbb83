// ── Core error types ──
//
// Errors surfaced by workers, the tracker, the script scheduler and the
// dispatch path. Dispatch failures are grouped under `HandleSensor` so a
// caller can ask "did dispatch succeed" without matching every subtype,
// while logs keep the specific `HandleSensorError`.

use std::path::PathBuf;

use thiserror::Error;

use sensorlink_api::ApiError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Tracker ──────────────────────────────────────────────────────
    #[error("sensor not found: {id}")]
    SensorNotFound { id: String },

    #[error("sensor tracker not ready (reset and not reinitialised)")]
    TrackerNotReady,

    // ── Entity ───────────────────────────────────────────────────────
    #[error("invalid sensor entity {id:?}: {reason}")]
    InvalidEntity { id: String, reason: String },

    // ── Worker lifecycle ─────────────────────────────────────────────
    #[error("worker {id} failed to start: {reason}")]
    WorkerStart { id: String, reason: String },

    #[error("worker {id} is disabled")]
    WorkerDisabled { id: String },

    #[error("worker {id} already started")]
    WorkerAlreadyStarted { id: String },

    #[error("worker {id} already stopped")]
    WorkerAlreadyStopped { id: String },

    #[error("worker not found: {id}")]
    WorkerNotFound { id: String },

    // ── Script scheduler ─────────────────────────────────────────────
    #[error("unknown script: {}", path.display())]
    UnknownScript { path: PathBuf },

    #[error("script already started: {}", path.display())]
    AlreadyStarted { path: PathBuf },

    #[error("script already stopped: {}", path.display())]
    AlreadyStopped { path: PathBuf },

    #[error("could not schedule script {}: {reason}", path.display())]
    SchedulingFailed { path: PathBuf, reason: String },

    #[error("invalid schedule {expr:?}: {reason}")]
    ParseSchedule { expr: String, reason: String },

    #[error("script {} failed: {reason}", path.display())]
    ScriptExecution { path: PathBuf, reason: String },

    #[error("could not parse script output: {reason}")]
    ScriptOutput { reason: String },

    // ── Dispatch ─────────────────────────────────────────────────────
    #[error("sensor handling failed: {0}")]
    HandleSensor(#[from] HandleSensorError),

    // ── Registry / IO ────────────────────────────────────────────────
    #[error("registry error: {message}")]
    Registry { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Returns `true` for any dispatch failure, whatever the subtype.
    pub fn is_handle_sensor(&self) -> bool {
        matches!(self, Self::HandleSensor(_))
    }
}

/// Detailed reasons a sensor dispatch failed.
#[derive(Debug, Error)]
pub enum HandleSensorError {
    #[error("could not build request for sensor {id}: {reason}")]
    InvalidRequest { id: String, reason: String },

    #[error("transport failure: {0}")]
    Transport(#[from] sensorlink_api::Error),

    #[error("could not decode response: {0}")]
    Decode(sensorlink_api::Error),

    #[error("sensor update failed for {id}: {error}")]
    Remote { id: String, error: ApiError },

    #[error("indeterminate status response for sensor {id}: {reason}")]
    Indeterminate { id: String, reason: String },

    #[error("sensor update unsuccessful for {id}")]
    Unsuccessful { id: String },

    #[error("sensor registration failed for {id}")]
    RegistrationFailed { id: String },

    #[error("could not disable sensor {id}: {reason}")]
    Disable { id: String, reason: String },

    #[error("{} sensors failed: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<HandleSensorError>),
}

impl HandleSensorError {
    /// Sensor IDs named by this error, including nested batch failures.
    pub fn sensor_ids(&self) -> Vec<&str> {
        match self {
            Self::InvalidRequest { id, .. }
            | Self::Remote { id, .. }
            | Self::Indeterminate { id, .. }
            | Self::Unsuccessful { id }
            | Self::RegistrationFailed { id }
            | Self::Disable { id, .. } => vec![id.as_str()],
            Self::Multiple(errors) => errors.iter().flat_map(Self::sensor_ids).collect(),
            Self::Transport(_) | Self::Decode(_) => Vec::new(),
        }
    }

    /// Collapse a list of per-sensor failures into one result.
    pub(crate) fn join(mut errors: Vec<Self>) -> Result<(), Self> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

fn join_errors(errors: &[HandleSensorError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_names_sensor() {
        let err = HandleSensorError::Remote {
            id: "cpu_temp".into(),
            error: ApiError {
                code: Some("invalid_format".into()),
                message: Some("bad".into()),
            },
        };
        assert_eq!(
            err.to_string(),
            "sensor update failed for cpu_temp: invalid_format: bad"
        );
        assert_eq!(err.sensor_ids(), vec!["cpu_temp"]);
    }

    #[test]
    fn join_collapses() {
        assert!(HandleSensorError::join(Vec::new()).is_ok());

        let single = HandleSensorError::join(vec![HandleSensorError::Unsuccessful {
            id: "a".into(),
        }])
        .unwrap_err();
        assert!(matches!(single, HandleSensorError::Unsuccessful { .. }));

        let many = HandleSensorError::join(vec![
            HandleSensorError::Unsuccessful { id: "a".into() },
            HandleSensorError::RegistrationFailed { id: "b".into() },
        ])
        .unwrap_err();
        assert_eq!(many.sensor_ids(), vec!["a", "b"]);
        assert!(many.to_string().starts_with("2 sensors failed"));
    }

    #[test]
    fn umbrella_wraps_subtypes() {
        let err: CoreError = HandleSensorError::Unsuccessful { id: "x".into() }.into();
        assert!(err.is_handle_sensor());
        assert!(!CoreError::TrackerNotReady.is_handle_sensor());
    }
}
