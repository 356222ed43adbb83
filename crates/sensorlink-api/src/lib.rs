// sensorlink-api: wire shapes and HTTP transport for the remote state-sink

pub mod client;
pub mod error;
pub mod request;
pub mod response;
pub mod transport;

pub use client::{ApiClient, RestClient};
pub use error::Error;
pub use request::{Location, Payload, Request, RequestType, SensorRegistration, SensorState};
pub use response::{ApiError, Indeterminate, RegistrationStatus, Response, SensorStatus};
pub use transport::{RetryPolicy, TlsMode, TransportConfig};
