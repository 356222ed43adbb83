// Built-in sensor sources.

pub mod external_ip;

pub use external_ip::{ExternalIp, ExternalIpConfig};
