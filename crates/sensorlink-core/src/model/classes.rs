// ── Sensor classification enums ──
//
// String forms match the remote API's vocabulary so script output and
// configuration can name them textually.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Sensor vs. binary sensor.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityType {
    #[default]
    Sensor,
    BinarySensor,
}

/// How the remote should interpret a sensor's state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DeviceClass {
    // Sensor classes
    ApparentPower,
    Aqi,
    AtmosphericPressure,
    Battery,
    CarbonDioxide,
    CarbonMonoxide,
    Current,
    DataRate,
    DataSize,
    Date,
    Distance,
    Duration,
    Energy,
    EnergyStorage,
    Enum,
    Frequency,
    Gas,
    Humidity,
    Illuminance,
    Irradiance,
    Moisture,
    Monetary,
    Pm25,
    Pm10,
    Power,
    PowerFactor,
    Pressure,
    ReactivePower,
    SignalStrength,
    SoundPressure,
    Speed,
    Temperature,
    Timestamp,
    VolatileOrganicCompounds,
    Voltage,
    Volume,
    Water,
    Weight,
    // Binary sensor classes
    BatteryCharging,
    Cold,
    Connectivity,
    Door,
    GarageDoor,
    Heat,
    Light,
    Lock,
    Motion,
    Moving,
    Occupancy,
    Opening,
    Plug,
    Presence,
    Problem,
    Running,
    Safety,
    Smoke,
    Sound,
    Tamper,
    Update,
    Vibration,
    Window,
}

/// Statistics semantics of a numeric sensor.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StateClass {
    Measurement,
    Total,
    TotalIncreasing,
}

/// Entity category shown separately from primary sensors.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Diagnostic,
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_class_parses_case_insensitively() {
        assert_eq!("temperature".parse::<DeviceClass>().ok(), Some(DeviceClass::Temperature));
        assert_eq!("Data_Rate".parse::<DeviceClass>().ok(), Some(DeviceClass::DataRate));
        assert!("flux_capacitance".parse::<DeviceClass>().is_err());
    }

    #[test]
    fn wire_names() {
        assert_eq!(EntityType::BinarySensor.to_string(), "binary_sensor");
        assert_eq!(StateClass::TotalIncreasing.to_string(), "total_increasing");
        assert_eq!(DeviceClass::Pm25.to_string(), "pm25");
        assert_eq!(Category::Diagnostic.to_string(), "diagnostic");
    }
}
