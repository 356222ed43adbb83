// sensorlink-core: Sensor workers, fan-in, tracking and dispatch between
// sensorlink-api and the agent binary.

pub mod agent;
pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod poller;
pub mod scripts;
pub mod sensors;
pub mod store;
pub mod worker;

// ── Primary re-exports ──────────────────────────────────────────────
pub use agent::{Agent, SHUTDOWN_GRACE};
pub use config::{AgentConfig, DEFAULT_CHANNEL_CAPACITY};
pub use dispatch::{Dispatcher, Outcome};
pub use error::{CoreError, HandleSensorError};
pub use poller::poll_sensors;
pub use scripts::{Schedule, Script, ScriptWorker};
pub use sensors::{ExternalIp, ExternalIpConfig};
pub use store::{MemoryRegistry, Registry, Tracker, WorkerPrefs};
pub use worker::{PollingWorker, SensorSource, Worker, WorkerManager};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Category, DeviceClass, Entity, EntityBuilder, EntityState, EntityType, StateClass, StateValue,
};
