// ── Sensor entity ──
//
// One sensor reading: identity, classification and (optionally) state.
// Fields are private; entities are built through `EntityBuilder` so the
// invariants below always hold for any `Entity` value:
//
// - `id` and `name` are non-empty
// - `icon`, when set, carries the `mdi:` prefix
// - a state always has a value

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::classes::{Category, DeviceClass, EntityType, StateClass};

/// Required prefix for entity icons.
pub const ICON_PREFIX: &str = "mdi:";

// ── StateValue ───────────────────────────────────────────────────────

/// Polymorphic sensor value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl StateValue {
    /// Convert a JSON value. `null` has no sensor value; arrays and
    /// objects are carried as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            other => Some(Self::Text(other.to_string())),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for StateValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for StateValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

// ── EntityState ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    value: StateValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, serde_json::Value>,
}

impl EntityState {
    pub fn value(&self) -> &StateValue {
        &self.value
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    pub fn attributes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.attributes
    }
}

// ── Entity ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: String,
    name: String,
    #[serde(rename = "type")]
    entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_class: Option<DeviceClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state_class: Option<StateClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<EntityState>,
    #[serde(default)]
    retryable: bool,
}

impl Entity {
    /// Start building an entity with the given identity.
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> EntityBuilder {
        EntityBuilder::new(id, name)
    }

    /// Builder seeded with this entity's fields, for template-style workers
    /// that fill in a fresh value per reading.
    pub fn to_builder(&self) -> EntityBuilder {
        let state = self.state.as_ref();
        EntityBuilder {
            id: self.id.clone(),
            name: self.name.clone(),
            entity_type: self.entity_type,
            device_class: self.device_class,
            state_class: self.state_class,
            category: self.category,
            value: state.map(|s| s.value.clone()),
            units: state.and_then(|s| s.units.clone()),
            icon: state.and_then(|s| s.icon.clone()),
            attributes: state.map(|s| s.attributes.clone()).unwrap_or_default(),
            retryable: self.retryable,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn device_class(&self) -> Option<DeviceClass> {
        self.device_class
    }

    pub fn state_class(&self) -> Option<StateClass> {
        self.state_class
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn state(&self) -> Option<&EntityState> {
        self.state.as_ref()
    }

    /// Shortcut for the state value, if a state is attached.
    pub fn value(&self) -> Option<&StateValue> {
        self.state.as_ref().map(|s| &s.value)
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

// ── EntityBuilder ────────────────────────────────────────────────────

/// Chained construction of an [`Entity`].
///
/// Each setter overwrites any earlier call for the same field. A state is
/// attached when any of value, units, icon or attributes is set.
#[derive(Debug, Clone)]
pub struct EntityBuilder {
    id: String,
    name: String,
    entity_type: EntityType,
    device_class: Option<DeviceClass>,
    state_class: Option<StateClass>,
    category: Option<Category>,
    value: Option<StateValue>,
    units: Option<String>,
    icon: Option<String>,
    attributes: BTreeMap<String, serde_json::Value>,
    retryable: bool,
}

impl EntityBuilder {
    fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            entity_type: EntityType::Sensor,
            device_class: None,
            state_class: None,
            category: None,
            value: None,
            units: None,
            icon: None,
            attributes: BTreeMap::new(),
            retryable: false,
        }
    }

    pub fn entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = entity_type;
        self
    }

    pub fn device_class(mut self, class: impl Into<Option<DeviceClass>>) -> Self {
        self.device_class = class.into();
        self
    }

    pub fn state_class(mut self, class: impl Into<Option<StateClass>>) -> Self {
        self.state_class = class.into();
        self
    }

    pub fn category(mut self, category: impl Into<Option<Category>>) -> Self {
        self.category = category.into();
        self
    }

    pub fn value(mut self, value: impl Into<StateValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Replace all attributes.
    pub fn attributes(mut self, attributes: BTreeMap<String, serde_json::Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn build(self) -> Result<Entity, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidEntity {
            id: self.id.clone(),
            reason: reason.to_owned(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if let Some(ref icon) = self.icon {
            if !icon.starts_with(ICON_PREFIX) || icon.len() == ICON_PREFIX.len() {
                return Err(invalid(&format!("icon {icon:?} must start with {ICON_PREFIX}")));
            }
        }

        let has_state = self.value.is_some()
            || self.units.is_some()
            || self.icon.is_some()
            || !self.attributes.is_empty();

        let state = if has_state {
            let value = self
                .value
                .ok_or_else(|| invalid("state attached without a value"))?;
            Some(EntityState {
                value,
                units: self.units,
                icon: self.icon,
                attributes: self.attributes,
            })
        } else {
            None
        };

        Ok(Entity {
            id: self.id,
            name: self.name,
            entity_type: self.entity_type,
            device_class: self.device_class,
            state_class: self.state_class,
            category: self.category,
            state,
            retryable: self.retryable,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builder_last_call_wins() {
        let entity = Entity::builder("cpu_temp", "CPU Temperature")
            .value(40)
            .units("°C")
            .value(42)
            .device_class(DeviceClass::Temperature)
            .state_class(StateClass::Measurement)
            .build()
            .unwrap();

        assert_eq!(entity.value(), Some(&StateValue::Int(42)));
        assert_eq!(entity.state().unwrap().units(), Some("°C"));
        assert_eq!(entity.entity_type(), EntityType::Sensor);
        assert!(entity.category().is_none());
        assert!(!entity.is_retryable());
    }

    #[test]
    fn empty_identity_rejected() {
        assert!(matches!(
            Entity::builder("", "Name").build(),
            Err(CoreError::InvalidEntity { .. })
        ));
        assert!(matches!(
            Entity::builder("id", "  ").build(),
            Err(CoreError::InvalidEntity { .. })
        ));
    }

    #[test]
    fn icon_prefix_enforced() {
        let err = Entity::builder("fan", "Fan")
            .value(1)
            .icon("fan")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("mdi:"));

        let ok = Entity::builder("fan", "Fan")
            .value(1)
            .icon("mdi:fan")
            .build()
            .unwrap();
        assert_eq!(ok.state().unwrap().icon(), Some("mdi:fan"));
    }

    #[test]
    fn state_requires_value() {
        let err = Entity::builder("x", "X").units("W").build().unwrap_err();
        assert!(err.to_string().contains("without a value"));

        let stateless = Entity::builder("x", "X").build().unwrap();
        assert!(stateless.state().is_none());
    }

    #[test]
    fn to_builder_keeps_template_fields() {
        let template = Entity::builder("load", "Load")
            .value(0.0)
            .units("%")
            .icon("mdi:gauge")
            .attribute("cores", 8)
            .retryable(true)
            .build()
            .unwrap();

        let next = template.to_builder().value(12.5).build().unwrap();
        assert_eq!(next.value(), Some(&StateValue::Float(12.5)));
        assert_eq!(next.state().unwrap().units(), Some("%"));
        assert_eq!(next.state().unwrap().attributes()["cores"], json!(8));
        assert!(next.is_retryable());
    }

    #[test]
    fn state_value_from_json() {
        assert_eq!(StateValue::from_json(&json!(true)), Some(StateValue::Bool(true)));
        assert_eq!(StateValue::from_json(&json!(3)), Some(StateValue::Int(3)));
        assert_eq!(StateValue::from_json(&json!(1.5)), Some(StateValue::Float(1.5)));
        assert_eq!(StateValue::from_json(&json!("on")), Some(StateValue::Text("on".into())));
        assert_eq!(StateValue::from_json(&json!(null)), None);
        assert_eq!(
            StateValue::from_json(&json!([1, 2])),
            Some(StateValue::Text("[1,2]".into()))
        );
    }
}
