//! Outbound request envelope.
//!
//! Every call to the state-sink is a `POST` of
//! `{"type": "<request type>", "data": <payload>}`. The retryable flag
//! never goes on the wire; it only steers [`RestClient`](crate::RestClient).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Error;

// ── Request type tag ─────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestType {
    RegisterSensor,
    UpdateSensorStates,
    UpdateLocation,
}

// ── Payloads ─────────────────────────────────────────────────────────

/// State fields shared by registration and update requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorState {
    pub state: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub unique_id: String,
    /// `sensor` or `binary_sensor`.
    #[serde(rename = "type")]
    pub sensor_type: String,
}

/// Full descriptive metadata sent once when a sensor is first seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRegistration {
    #[serde(flatten)]
    pub state: SensorState,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

/// Device location report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// `[latitude, longitude]`
    pub gps: [f64; 2],
    pub gps_accuracy: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_accuracy: Option<u32>,
}

/// Request body, one variant per [`RequestType`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Registration(Box<SensorRegistration>),
    States(Vec<SensorState>),
    Location(Location),
}

// ── Request ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    #[serde(rename = "type")]
    kind: RequestType,
    data: Payload,
    #[serde(skip)]
    retryable: bool,
}

impl Request {
    /// `register_sensor` request.
    pub fn registration(registration: SensorRegistration) -> Self {
        Self {
            kind: RequestType::RegisterSensor,
            data: Payload::Registration(Box::new(registration)),
            retryable: false,
        }
    }

    /// `update_sensor_states` request carrying one or more states.
    pub fn update(states: Vec<SensorState>) -> Self {
        Self {
            kind: RequestType::UpdateSensorStates,
            data: Payload::States(states),
            retryable: false,
        }
    }

    /// `update_location` request.
    pub fn location(location: Location) -> Self {
        Self {
            kind: RequestType::UpdateLocation,
            data: Payload::Location(location),
            retryable: false,
        }
    }

    /// Mark whether transport failures should be retried.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn kind(&self) -> RequestType {
        self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.data
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Encode the envelope as JSON bytes.
    pub fn to_body(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| Error::Encode(e.to_string()))
    }
}
