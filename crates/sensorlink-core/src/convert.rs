// ── Entity-to-wire conversions ──
//
// Projects a domain `Entity` onto the `sensorlink_api` request payloads.
// Registration and update share `SensorState`, so the fields both carry
// (ID, state, icon, attributes, type) are produced by one function.

use sensorlink_api::{SensorRegistration, SensorState};

use crate::error::HandleSensorError;
use crate::model::Entity;

impl TryFrom<&Entity> for SensorState {
    type Error = HandleSensorError;

    fn try_from(entity: &Entity) -> Result<Self, Self::Error> {
        let state = entity
            .state()
            .ok_or_else(|| HandleSensorError::InvalidRequest {
                id: entity.id().to_owned(),
                reason: "entity has no state".into(),
            })?;

        Ok(Self {
            state: state.value().to_json(),
            attributes: (!state.attributes().is_empty()).then(|| state.attributes().clone()),
            icon: state.icon().map(str::to_owned),
            unique_id: entity.id().to_owned(),
            sensor_type: entity.entity_type().to_string(),
        })
    }
}

impl TryFrom<&Entity> for SensorRegistration {
    type Error = HandleSensorError;

    fn try_from(entity: &Entity) -> Result<Self, Self::Error> {
        let state = SensorState::try_from(entity)?;
        Ok(Self {
            state,
            name: entity.name().to_owned(),
            unit_of_measurement: entity
                .state()
                .and_then(|s| s.units())
                .map(str::to_owned),
            device_class: entity.device_class().map(|c| c.to_string()),
            state_class: entity.state_class().map(|c| c.to_string()),
            entity_category: entity.category().map(|c| c.to_string()),
            disabled: false,
        })
    }
}
