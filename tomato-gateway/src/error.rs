//! Gateway error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::models::{Actuator, Mode};

/// Reasons an inbound pub/sub message is dropped.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("sensor payload is not valid JSON: {0}")]
    MalformedSensorJson(#[source] serde_json::Error),

    #[error("sensor payload must be a JSON object")]
    SensorPayloadNotObject,

    #[error("unknown mode: {0:?}")]
    UnknownMode(String),

    #[error("no route for topic {0}")]
    UnknownTopic(String),
}

/// Outbound publish failures.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("publish timed out after {0} ms")]
    Timeout(u64),
}

/// Detector failures, surfaced to the image submitter.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("No image")]
    EmptyImage,

    #[error("Invalid image: {0}")]
    Decode(String),
}

/// Control surface failures. Each maps to one HTTP status.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("System in {0} mode - cannot control manually")]
    ModeForbids(Mode),

    #[error("Invalid mode: {0:?}")]
    InvalidMode(String),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error("command publish failed for {}", join(.0))]
    CommandFailed(Vec<Actuator>),
}

impl ControlError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ControlError::ModeForbids(_) => StatusCode::FORBIDDEN,
            ControlError::InvalidMode(_) => StatusCode::BAD_REQUEST,
            ControlError::Detection(DetectionError::EmptyImage) => StatusCode::BAD_REQUEST,
            ControlError::Detection(DetectionError::Decode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ControlError::CommandFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn join(actuators: &[Actuator]) -> String {
    actuators.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_error_status_codes() {
        assert_eq!(ControlError::ModeForbids(Mode::Auto).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ControlError::InvalidMode("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ControlError::from(DetectionError::EmptyImage).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ControlError::from(DetectionError::Decode("bad".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_command_failed_message_lists_actuators() {
        let err = ControlError::CommandFailed(vec![Actuator::Pump, Actuator::Light]);
        assert_eq!(err.to_string(), "command publish failed for pump, light");
    }
}
