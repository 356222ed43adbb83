// ── Local sensor state ──

mod registry;
mod tracker;

pub use registry::{MemoryRegistry, Registry, WorkerPrefs};
pub use tracker::Tracker;
