//! Image detection capability.
//!
//! The gateway never looks inside an image; it hands the bytes to a
//! `Detector` and consumes the result. `PlaceholderDetector` stands in until
//! a real model is plugged in.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::DetectionError;
use crate::models::DetectionResult;

#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<DetectionResult, DetectionError>;
}

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Accepts JPEG and PNG by signature and reports no findings.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderDetector;

#[async_trait]
impl Detector for PlaceholderDetector {
    async fn detect(&self, image: &[u8]) -> Result<DetectionResult, DetectionError> {
        if image.is_empty() {
            return Err(DetectionError::EmptyImage);
        }
        if !image.starts_with(JPEG_MAGIC) && !image.starts_with(PNG_MAGIC) {
            return Err(DetectionError::Decode("unsupported or corrupt image data".into()));
        }
        Ok(DetectionResult {
            pest_detected: false,
            disease_detected: false,
            ripe_count: 0,
            confidence: 0.0,
            timestamp: OffsetDateTime::now_utc(),
        })
    }
}
