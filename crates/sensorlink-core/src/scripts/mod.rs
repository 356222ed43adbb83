// User-supplied scripts as sensor sources.

pub mod schedule;
pub mod scheduler;
pub mod script;
pub mod worker;

pub use schedule::Schedule;
pub use scheduler::{JobId, Scheduler};
pub use script::Script;
pub use worker::{Job, SCRIPT_WORKER_ID, ScriptWorker};
