/*!
Test harness for the gateway.

Wires a complete `Gateway` to a `MockMqttClient`, feeds inbound messages
through the real ingest router and exposes what went out on the wire.
*/

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tomato_gateway::config::GatewayConfig;
use tomato_gateway::models::GatewayState;
use tomato_gateway::{Actuator, Detector, Gateway, IngestError, Mode, PlaceholderDetector};

use crate::mqtt_stub::MockMqttClient;
use crate::payloads::SensorPayloadBuilder;

pub struct TestHarness {
    pub gateway: Gateway,
    pub mqtt_client: MockMqttClient,
    worker: JoinHandle<()>,
}

impl TestHarness {
    /// Default configuration, placeholder detector. Needs a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(GatewayConfig::default(), Arc::new(PlaceholderDetector))
    }

    pub fn with_mode(mode: Mode) -> Self {
        let mut config = GatewayConfig::default();
        config.policy.initial_mode = mode;
        Self::with_config(config, Arc::new(PlaceholderDetector))
    }

    pub fn with_config(config: GatewayConfig, detector: Arc<dyn Detector>) -> Self {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let mqtt_client = MockMqttClient::new();
        let (gateway, worker) = Gateway::start(config, Arc::new(mqtt_client.clone()), detector);
        Self { gateway, mqtt_client, worker }
    }

    pub fn state(&self) -> GatewayState {
        self.gateway.store().get()
    }

    /// Delivers a message as if it came from the broker.
    pub async fn deliver(&self, topic: &str, payload: &[u8]) -> Result<(), IngestError> {
        self.gateway.ingest().handle(topic, payload).await
    }

    pub async fn send_sensors(&self, payload: SensorPayloadBuilder) -> Result<(), IngestError> {
        let topic = self.gateway.config().topics.sensors.clone();
        self.deliver(&topic, &payload.build()).await
    }

    pub async fn send_mode(&self, mode: &str) -> Result<(), IngestError> {
        let topic = self.gateway.config().topics.mode.clone();
        self.deliver(&topic, mode.as_bytes()).await
    }

    /// Lets the policy worker and timers run. With a paused clock this
    /// returns as soon as every task is idle.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    /// Advances (paused) time by `duration`, letting timers fire on the way.
    pub async fn advance(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
        self.settle().await;
    }

    /// `on`/`off` commands published for `actuator`, oldest first.
    pub fn commands_for(&self, actuator: Actuator) -> Vec<String> {
        self.mqtt_client.payloads_on(self.gateway.config().topics.control(actuator))
    }

    pub fn alerts(&self) -> Vec<serde_json::Value> {
        self.mqtt_client.json_messages_on(&self.gateway.config().topics.alert)
    }

    pub fn worker_alive(&self) -> bool {
        !self.worker.is_finished()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
