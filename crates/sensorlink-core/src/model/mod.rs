// ── Domain model ──

pub mod classes;
pub mod entity;

pub use classes::{Category, DeviceClass, EntityType, StateClass};
pub use entity::{Entity, EntityBuilder, EntityState, ICON_PREFIX, StateValue};
