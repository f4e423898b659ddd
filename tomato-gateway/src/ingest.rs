//! Ingest router: classifies inbound pub/sub messages and folds them into the
//! state store. Sensor data also fires the policy worker.

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::Topics;
use crate::error::IngestError;
use crate::models::{Mode, Node, SensorReport};
use crate::modes::ModeController;
use crate::policy::PolicyTrigger;
use crate::state::StateStore;

pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

/// Routes known to the gateway. Adding a topic means adding a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    SensorData,
    NodeStatus(Node),
    ModeControl,
}

impl TopicKind {
    pub fn classify(topics: &Topics, topic: &str) -> Option<Self> {
        if topic == topics.sensors {
            Some(TopicKind::SensorData)
        } else if topic == topics.sensor_status {
            Some(TopicKind::NodeStatus(Node::Sensor))
        } else if topic == topics.camera_status {
            Some(TopicKind::NodeStatus(Node::Camera))
        } else if topic == topics.mode {
            Some(TopicKind::ModeControl)
        } else {
            None
        }
    }
}

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    SensorData(SensorReport),
    NodeStatus { node: Node, online: bool },
    ModeChange(Mode),
}

impl InboundMessage {
    pub fn parse(topics: &Topics, topic: &str, payload: &[u8]) -> Result<Self, IngestError> {
        let kind = TopicKind::classify(topics, topic).ok_or_else(|| IngestError::UnknownTopic(topic.to_string()))?;
        let text = std::str::from_utf8(payload).map_err(|_| IngestError::InvalidUtf8)?;
        match kind {
            TopicKind::SensorData => parse_sensor_report(text).map(InboundMessage::SensorData),
            TopicKind::NodeStatus(node) => Ok(InboundMessage::NodeStatus { node, online: text == ONLINE }),
            TopicKind::ModeControl => text
                .parse::<Mode>()
                .map(InboundMessage::ModeChange)
                .map_err(IngestError::UnknownMode),
        }
    }
}

fn parse_sensor_report(text: &str) -> Result<SensorReport, IngestError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(IngestError::MalformedSensorJson)?;
    if !value.is_object() {
        return Err(IngestError::SensorPayloadNotObject);
    }
    serde_json::from_value(value).map_err(IngestError::MalformedSensorJson)
}

#[derive(Clone)]
pub struct IngestRouter {
    topics: std::sync::Arc<Topics>,
    store: StateStore,
    modes: ModeController,
    policy: PolicyTrigger,
}

impl IngestRouter {
    pub fn new(topics: std::sync::Arc<Topics>, store: StateStore, modes: ModeController, policy: PolicyTrigger) -> Self {
        Self { topics, store, modes, policy }
    }

    /// Handles one delivery. Malformed messages are logged and dropped; the
    /// state is left untouched for them. Only mode messages ever wait, for an
    /// actuator command in flight.
    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), IngestError> {
        let message = match InboundMessage::parse(&self.topics, topic, payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(topic, "dropping message: {e}");
                return Err(e);
            }
        };
        self.apply(message).await;
        Ok(())
    }

    pub async fn apply(&self, message: InboundMessage) {
        match message {
            InboundMessage::SensorData(report) => {
                let now = OffsetDateTime::now_utc();
                let snapshot = self.store.update(|s| {
                    s.sensors.merge(&report, now);
                    s.liveness.sensor_node = true;
                    s.clone()
                });
                debug!(temp = ?report.temp, moisture = ?report.moisture, light = ?report.light, "sensor update");
                self.policy.fire(snapshot);
            }
            InboundMessage::NodeStatus { node, online } => {
                self.store.update(|s| s.liveness.set(node, online));
                info!(%node, online, "node status");
            }
            InboundMessage::ModeChange(mode) => {
                self.modes.apply_remote(mode).await;
            }
        }
    }
}
