//! Command handlers, one module per top-level subcommand.

pub mod config_cmd;
pub mod run;
pub mod scripts;

use sensorlink_core::{Entity, StateValue};
use serde::Serialize;
use tabled::Tabled;

// ── Shared sensor rendering ──────────────────────────────────────────

/// Flattened view of an entity for output.
#[derive(Debug, Serialize)]
pub struct SensorView {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub state: Option<StateValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl From<&Entity> for SensorView {
    fn from(e: &Entity) -> Self {
        let state = e.state();
        Self {
            id: e.id().to_owned(),
            name: e.name().to_owned(),
            sensor_type: e.entity_type().to_string(),
            state: e.value().cloned(),
            units: state.and_then(|s| s.units()).map(str::to_owned),
            icon: state.and_then(|s| s.icon()).map(str::to_owned),
        }
    }
}

#[derive(Tabled)]
pub struct SensorRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Units")]
    pub units: String,
}

pub fn sensor_row(v: &SensorView) -> SensorRow {
    SensorRow {
        id: v.id.clone(),
        name: v.name.clone(),
        state: v.state.as_ref().map(ToString::to_string).unwrap_or_default(),
        units: v.units.clone().unwrap_or_default(),
    }
}
