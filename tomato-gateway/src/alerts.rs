//! Alert emitter. One alert per finding in a detection result, every time:
//! repeated detections produce repeated alerts, nothing is deduplicated.

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::dispatcher::CommandDispatcher;
use crate::models::DetectionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Pest,
    Disease,
    Harvest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub confidence: f64,
    pub timestamp: String,
}

/// Alerts warranted by `result`, in pest, disease, harvest order.
pub fn alerts_for(result: &DetectionResult, at: OffsetDateTime) -> Vec<Alert> {
    let timestamp = at.format(&Rfc3339).unwrap_or_default();
    let alert = |kind, message: String| Alert { message, kind, confidence: result.confidence, timestamp: timestamp.clone() };

    let mut alerts = Vec::new();
    if result.pest_detected {
        alerts.push(alert(AlertKind::Pest, "Pest detected on plants!".into()));
    }
    if result.disease_detected {
        alerts.push(alert(AlertKind::Disease, "Plant disease detected!".into()));
    }
    if result.ripe_count > 0 {
        alerts.push(alert(AlertKind::Harvest, format!("{} tomatoes ready to harvest!", result.ripe_count)));
    }
    alerts
}

#[derive(Clone)]
pub struct AlertEmitter {
    dispatcher: CommandDispatcher,
}

impl AlertEmitter {
    pub fn new(dispatcher: CommandDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Publishes every alert for `result`; returns how many went out.
    pub async fn emit(&self, result: &DetectionResult) -> usize {
        let topic = self.dispatcher.topics().alert.clone();
        let mut sent = 0;
        for alert in alerts_for(result, OffsetDateTime::now_utc()) {
            let payload = match serde_json::to_vec(&alert) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("cannot encode alert: {e}");
                    continue;
                }
            };
            match self.dispatcher.publish_raw(&topic, payload).await {
                Ok(()) => {
                    info!(kind = ?alert.kind, "ALERT: {}", alert.message);
                    sent += 1;
                }
                Err(e) => warn!(kind = ?alert.kind, "alert not sent: {e}"),
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(pest: bool, disease: bool, ripe: u32) -> DetectionResult {
        DetectionResult {
            pest_detected: pest,
            disease_detected: disease,
            ripe_count: ripe,
            confidence: 0.87,
            timestamp: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_pest_and_ripe_give_two_alerts() {
        let alerts = alerts_for(&detection(true, false, 2), OffsetDateTime::UNIX_EPOCH);
        let kinds: Vec<_> = alerts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::Pest, AlertKind::Harvest]);
        assert_eq!(alerts[1].message, "2 tomatoes ready to harvest!");
    }

    #[test]
    fn test_clean_result_gives_no_alert() {
        assert!(alerts_for(&detection(false, false, 0), OffsetDateTime::UNIX_EPOCH).is_empty());
    }

    #[test]
    fn test_alert_wire_format() {
        let alerts = alerts_for(&detection(false, true, 0), OffsetDateTime::UNIX_EPOCH);
        let json = serde_json::to_value(&alerts[0]).unwrap();
        assert_eq!(json["type"], "disease");
        assert_eq!(json["message"], "Plant disease detected!");
        assert_eq!(json["confidence"], 0.87);
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
    }
}
