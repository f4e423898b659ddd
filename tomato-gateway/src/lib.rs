//! Tomato farm gateway: coordinates remote sensor/actuator nodes over MQTT,
//! applies the mode-dependent automation policy and serves the operator
//! control surface over HTTP.

pub mod alerts;
pub mod config;
pub mod control;
pub mod detection;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod health;
pub mod http;
pub mod ingest;
pub mod models;
pub mod modes;
pub mod mqtt;
pub mod policy;
pub mod state;
pub mod watering;

pub use config::GatewayConfig;
pub use detection::{Detector, PlaceholderDetector};
pub use dispatcher::Publisher;
pub use error::{ControlError, DetectionError, IngestError, PublishError};
pub use gateway::Gateway;
pub use models::{Actuator, DetectionResult, Mode};
