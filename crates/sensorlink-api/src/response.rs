//! Inbound response decoding.
//!
//! Update responses map each sensor ID to a [`SensorStatus`]; registration
//! responses carry a single success flag. Optional fields are kept as raw
//! JSON so "absent", "null" and "wrong type" stay distinguishable.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::Error;

// ── ApiError ─────────────────────────────────────────────────────────

/// Structured per-sensor error returned by the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{code}: {message}"),
            (None, Some(text)) | (Some(text), None) => f.write_str(text),
            (None, None) => f.write_str("unknown error"),
        }
    }
}

impl std::error::Error for ApiError {}

/// A success field that is present but neither a boolean nor null.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("indeterminate success value: {0}")]
pub struct Indeterminate(pub String);

// ── Per-sensor status ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SensorStatus {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    success: Option<Value>,
    #[serde(default)]
    is_disabled: Option<Value>,
}

impl SensorStatus {
    /// The remote-reported error, if any.
    ///
    /// Absent or `null` means no error. A string is taken as the message;
    /// any other shape that is not a `{code, message}` object still counts
    /// as an error, reported as "unknown error".
    pub fn has_error(&self) -> Option<ApiError> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(message) => Some(ApiError {
                code: None,
                message: Some(message.clone()),
            }),
            other => Some(serde_json::from_value(other.clone()).unwrap_or_default()),
        }
    }

    /// Whether the remote reported success.
    ///
    /// Absent or `null` defaults to `true`.
    pub fn has_success(&self) -> Result<bool, Indeterminate> {
        interpret_success(self.success.as_ref())
    }

    /// Whether the remote reports this sensor as disabled.
    pub fn sensor_disabled(&self) -> bool {
        matches!(self.is_disabled, Some(Value::Bool(true)))
    }
}

// ── Registration status ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegistrationStatus {
    #[serde(default)]
    success: Option<Value>,
}

impl RegistrationStatus {
    pub fn has_success(&self) -> Result<bool, Indeterminate> {
        interpret_success(self.success.as_ref())
    }
}

fn interpret_success(value: Option<&Value>) -> Result<bool, Indeterminate> {
    match value {
        None | Some(Value::Null) => Ok(true),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(Indeterminate(other.to_string())),
    }
}

// ── Response ─────────────────────────────────────────────────────────

/// Raw JSON response body, decoded lazily into the shape the caller expects.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    body: Value,
}

impl Response {
    /// Parse a response body. An empty body is treated as `{}`.
    pub fn from_body(body: &str) -> Result<Self, Error> {
        if body.trim().is_empty() {
            return Ok(Self {
                body: Value::Object(serde_json::Map::new()),
            });
        }
        let body = serde_json::from_str(body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.to_owned(),
        })?;
        Ok(Self { body })
    }

    pub fn from_value(body: Value) -> Self {
        Self { body }
    }

    pub fn raw(&self) -> &Value {
        &self.body
    }

    /// Decode as a mapping of sensor ID to per-sensor status.
    pub fn sensor_states(&self) -> Result<BTreeMap<String, SensorStatus>, Error> {
        self.decode()
    }

    /// Decode as a registration response.
    pub fn registration(&self) -> Result<RegistrationStatus, Error> {
        self.decode()
    }

    fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(self.body.clone()).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: self.body.to_string(),
        })
    }
}
