/*!
Payload builders and fixtures in the shape the remote nodes send them.
*/

use async_trait::async_trait;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use tomato_gateway::{DetectionError, DetectionResult, Detector};

/// Builds a sensor-node JSON payload with only the fields that were set.
#[derive(Debug, Clone, Default)]
pub struct SensorPayloadBuilder {
    fields: Map<String, Value>,
}

impl SensorPayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn field(mut self, name: &str, value: f64) -> Self {
        self.fields.insert(name.to_string(), Value::from(value));
        self
    }

    pub fn temp(self, value: f64) -> Self {
        self.field("temp", value)
    }

    pub fn humidity(self, value: f64) -> Self {
        self.field("humidity", value)
    }

    pub fn soil_temp(self, value: f64) -> Self {
        self.field("soil_temp", value)
    }

    pub fn moisture(self, value: f64) -> Self {
        self.field("moisture", value)
    }

    pub fn light(self, value: f64) -> Self {
        self.field("light", value)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn build(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }
}

/// A minimal JPEG header, enough for the placeholder detector.
pub fn jpeg_fixture() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00]
}

/// Detector returning a preset result, or a decode error when built with `failing`.
#[derive(Debug, Clone)]
pub struct FixedDetector {
    result: Option<(bool, bool, u32, f64)>,
}

impl FixedDetector {
    pub fn new(pest_detected: bool, disease_detected: bool, ripe_count: u32, confidence: f64) -> Self {
        Self { result: Some((pest_detected, disease_detected, ripe_count, confidence)) }
    }

    pub fn failing() -> Self {
        Self { result: None }
    }
}

#[async_trait]
impl Detector for FixedDetector {
    async fn detect(&self, image: &[u8]) -> Result<DetectionResult, DetectionError> {
        if image.is_empty() {
            return Err(DetectionError::EmptyImage);
        }
        let Some((pest_detected, disease_detected, ripe_count, confidence)) = self.result else {
            return Err(DetectionError::Decode("fixture decoder failure".into()));
        };
        Ok(DetectionResult {
            pest_detected,
            disease_detected,
            ripe_count,
            confidence,
            timestamp: OffsetDateTime::now_utc(),
        })
    }
}
