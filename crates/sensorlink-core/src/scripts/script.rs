// ── External script sensors ──
//
// A script is an executable whose stdout describes a schedule and zero or
// more sensors. Output may be JSON, YAML or TOML; formats are tried in that
// order and the first successful parse wins:
//
//   {
//     "schedule": "@every 30s",
//     "sensors": [
//       { "sensor_name": "Backup Age", "sensor_state": 3, "sensor_units": "h" }
//     ]
//   }

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::schedule::Schedule;
use crate::error::CoreError;
use crate::model::{DeviceClass, Entity, EntityType, ICON_PREFIX, StateClass, StateValue};

const DEFAULT_ICON: &str = "mdi:script";

// ── Output format ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ScriptOutput {
    #[serde(default)]
    pub(crate) schedule: String,
    #[serde(default)]
    pub(crate) sensors: Vec<ScriptSensor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScriptSensor {
    sensor_name: String,
    #[serde(default)]
    sensor_state: serde_json::Value,
    #[serde(default)]
    sensor_icon: Option<String>,
    #[serde(default)]
    sensor_units: Option<String>,
    #[serde(default)]
    sensor_type: Option<String>,
    #[serde(default)]
    sensor_device_class: Option<String>,
    #[serde(default)]
    sensor_state_class: Option<String>,
    #[serde(default)]
    sensor_attributes: Option<BTreeMap<String, serde_json::Value>>,
}

impl ScriptSensor {
    fn into_entity(self) -> Result<Entity, CoreError> {
        let id = snake_case(&self.sensor_name);
        let value = StateValue::from_json(&self.sensor_state).ok_or_else(|| {
            CoreError::InvalidEntity {
                id: id.clone(),
                reason: "sensor_state is missing".into(),
            }
        })?;

        let icon = match self.sensor_icon {
            Some(icon) if icon.starts_with(ICON_PREFIX) => icon,
            Some(icon) if !icon.trim().is_empty() => format!("{ICON_PREFIX}{}", icon.trim()),
            _ => DEFAULT_ICON.to_owned(),
        };

        let entity_type = match self.sensor_type.as_deref() {
            Some("binary") => EntityType::BinarySensor,
            _ => EntityType::Sensor,
        };

        let mut builder = Entity::builder(id, self.sensor_name)
            .entity_type(entity_type)
            .value(value)
            .icon(icon)
            .device_class(
                self.sensor_device_class
                    .as_deref()
                    .and_then(|c| c.parse::<DeviceClass>().ok()),
            )
            .state_class(
                self.sensor_state_class
                    .as_deref()
                    .and_then(|c| c.parse::<StateClass>().ok()),
            );

        if let Some(units) = self.sensor_units {
            builder = builder.units(units);
        }
        if let Some(attributes) = self.sensor_attributes {
            builder = builder.attributes(attributes);
        }
        builder.build()
    }
}

/// Parse script output, trying JSON, then YAML, then TOML.
pub(crate) fn parse_output(stdout: &[u8]) -> Result<ScriptOutput, CoreError> {
    let json_err = match serde_json::from_slice::<ScriptOutput>(stdout) {
        Ok(out) => return Ok(out),
        Err(e) => e,
    };
    let yaml_err = match serde_yaml::from_slice::<ScriptOutput>(stdout) {
        Ok(out) => return Ok(out),
        Err(e) => e,
    };
    let toml_err = match std::str::from_utf8(stdout) {
        Ok(text) => match toml::from_str::<ScriptOutput>(text) {
            Ok(out) => return Ok(out),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    Err(CoreError::ScriptOutput {
        reason: format!("json: {json_err}; yaml: {yaml_err}; toml: {toml_err}"),
    })
}

/// Lowercase `name`, splitting words on non-alphanumerics and on
/// lower-to-upper case changes, joined with underscores.
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;

    for c in name.chars() {
        if c.is_alphanumeric() {
            if c.is_uppercase()
                && prev.is_some_and(|p| p.is_lowercase() || p.is_numeric())
            {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev = Some(c);
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev = None;
        }
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

// ── Script ───────────────────────────────────────────────────────────

/// An executable plus the schedule it declared when first run.
#[derive(Debug, Clone)]
pub struct Script {
    path: PathBuf,
    args: Vec<String>,
    schedule: Schedule,
}

impl Script {
    /// Load a script from a command line (`path [args...]`), running it
    /// once to learn its schedule.
    pub async fn load(command_line: &str) -> Result<Self, CoreError> {
        let mut parts = command_line.split_whitespace().map(str::to_owned);
        let path = parts
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| CoreError::UnknownScript {
                path: PathBuf::from(command_line),
            })?;
        let args: Vec<String> = parts.collect();

        let output = run(&path, &args).await?;
        let schedule = Schedule::parse(&output.schedule)?;
        debug!(script = %path.display(), %schedule, "script loaded");

        Ok(Self {
            path,
            args,
            schedule,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Run the script and convert its sensors. Individual sensors that
    /// fail validation are logged and dropped.
    pub async fn execute(&self) -> Result<Vec<Entity>, CoreError> {
        let output = run(&self.path, &self.args).await?;
        let entities = output
            .sensors
            .into_iter()
            .filter_map(|sensor| match sensor.into_entity() {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!(script = %self.path.display(), error = %e, "skipping script sensor");
                    None
                }
            })
            .collect();
        Ok(entities)
    }
}

async fn run(path: &Path, args: &[String]) -> Result<ScriptOutput, CoreError> {
    let output = Command::new(path)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| CoreError::ScriptExecution {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CoreError::ScriptExecution {
            path: path.to_path_buf(),
            reason: format!("{}: {}", output.status, stderr.trim()),
        });
    }

    parse_output(&output.stdout).map_err(|e| CoreError::ScriptExecution {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_names() {
        assert_eq!(snake_case("CPU Temp"), "cpu_temp");
        assert_eq!(snake_case("myScript Sensor"), "my_script_sensor");
        assert_eq!(snake_case("Disk 2 Usage%"), "disk_2_usage");
        assert_eq!(snake_case("  already_snake  "), "already_snake");
    }

    #[test]
    fn parses_json_first() {
        let out = parse_output(
            br#"{"schedule": "@every 5s", "sensors": [{"sensor_name": "A", "sensor_state": 1}]}"#,
        )
        .unwrap();
        assert_eq!(out.schedule, "@every 5s");
        assert_eq!(out.sensors.len(), 1);
    }

    #[test]
    fn falls_back_to_yaml() {
        let out = parse_output(
            b"schedule: '*/5 * * * *'\nsensors:\n  - sensor_name: Load\n    sensor_state: 0.5\n",
        )
        .unwrap();
        assert_eq!(out.schedule, "*/5 * * * *");
        assert_eq!(out.sensors[0].sensor_name, "Load");
    }

    #[test]
    fn falls_back_to_toml() {
        let out = parse_output(
            b"schedule = \"@hourly\"\n\n[[sensors]]\nsensor_name = \"Uptime\"\nsensor_state = 12\n",
        )
        .unwrap();
        assert_eq!(out.schedule, "@hourly");
        assert_eq!(out.sensors[0].sensor_state, serde_json::json!(12));
    }

    #[test]
    fn garbage_reports_all_formats() {
        let err = parse_output(b"{{{ nope = [").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("json:") && msg.contains("yaml:") && msg.contains("toml:"));
    }

    #[test]
    fn sensor_conversion_defaults() {
        let sensor: ScriptSensor = serde_json::from_value(serde_json::json!({
            "sensor_name": "Door Open",
            "sensor_state": true,
            "sensor_type": "binary",
            "sensor_device_class": "door",
            "sensor_attributes": {"room": "hall"}
        }))
        .unwrap();
        let entity = sensor.into_entity().unwrap();

        assert_eq!(entity.id(), "door_open");
        assert_eq!(entity.entity_type(), EntityType::BinarySensor);
        assert_eq!(entity.device_class(), Some(DeviceClass::Door));
        assert_eq!(entity.state().unwrap().icon(), Some(DEFAULT_ICON));
        assert_eq!(entity.value(), Some(&StateValue::Bool(true)));
    }

    #[test]
    fn icon_gets_prefix_and_unknown_classes_ignored() {
        let sensor: ScriptSensor = serde_json::from_value(serde_json::json!({
            "sensor_name": "Queue",
            "sensor_state": 4,
            "sensor_icon": "tray-full",
            "sensor_device_class": "not-a-class",
            "sensor_state_class": "total_increasing"
        }))
        .unwrap();
        let entity = sensor.into_entity().unwrap();

        assert_eq!(entity.state().unwrap().icon(), Some("mdi:tray-full"));
        assert_eq!(entity.device_class(), None);
        assert_eq!(entity.state_class(), Some(StateClass::TotalIncreasing));
    }

    #[test]
    fn missing_state_is_rejected() {
        let sensor: ScriptSensor =
            serde_json::from_value(serde_json::json!({"sensor_name": "Empty"})).unwrap();
        assert!(matches!(
            sensor.into_entity(),
            Err(CoreError::InvalidEntity { .. })
        ));
    }
}
