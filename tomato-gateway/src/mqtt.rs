//! MQTT link: outbound publisher and the inbound event loop.
//!
//! On every ConnAck the loop re-subscribes to the inbound topics and
//! publishes `online`; the broker publishes the `offline` last will if the
//! gateway drops. Connection errors back off exponentially up to a cap.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{GatewayConfig, MqttConf};
use crate::dispatcher::Publisher;
use crate::error::PublishError;
use crate::gateway::Gateway;
use crate::ingest::{OFFLINE, ONLINE};

#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    timeout: Duration,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        let publish = self.client.publish(topic, QoS::AtLeastOnce, false, payload);
        match tokio::time::timeout(self.timeout, publish).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PublishError::Transport(e.to_string())),
            Err(_) => Err(PublishError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

pub fn create_mqtt_client(cfg: &GatewayConfig) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new(&cfg.mqtt.client_id, &cfg.mqtt.host, cfg.mqtt.port);
    opts.set_keep_alive(Duration::from_secs(cfg.mqtt.keep_alive_secs));
    opts.set_last_will(LastWill::new(&cfg.topics.gateway_status, OFFLINE, QoS::AtLeastOnce, false));
    AsyncClient::new(opts, 32)
}

/// Exponential reconnect delay, capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(conf: &MqttConf) -> Self {
        let initial = Duration::from_millis(conf.reconnect_initial_ms);
        Self { initial, max: Duration::from_millis(conf.reconnect_max_ms), current: initial, attempts: 0 }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        self.attempts += 1;
        delay
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }
}

pub fn spawn_mqtt_listener(gateway: Gateway, client: AsyncClient, mut eventloop: EventLoop) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = Backoff::new(&gateway.config().mqtt);
        let max_attempts = gateway.config().mqtt.max_reconnect_attempts;
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("MQTT connected");
                    backoff.reset();
                    gateway.health().mark_mqtt_connected();
                    tokio::spawn(on_connected(gateway.clone(), client.clone()));
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    // drops are logged by the router; a mode message may wait
                    // for a command in flight, bounded by the publish timeout
                    let _ = gateway.ingest().handle(&p.topic, &p.payload).await;
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    warn!("MQTT broker closed the session");
                    gateway.health().mark_mqtt_disconnected();
                }
                Ok(_) => {}
                Err(e) => {
                    if max_attempts.is_some_and(|max| backoff.attempts() >= max) {
                        error!("MQTT giving up after {} attempts: {e}", backoff.attempts());
                        gateway.health().mark_mqtt_disconnected();
                        return;
                    }
                    let delay = backoff.next_delay();
                    warn!("MQTT error: {e}, retrying in {delay:?}");
                    gateway.health().increment_reconnects();
                    tokio::time::sleep(delay).await;
                }
            }
        }
    })
}

async fn on_connected(gateway: Gateway, client: AsyncClient) {
    for topic in gateway.config().topics.inbound() {
        if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
            error!(topic, "subscribe failed: {e}");
        } else {
            debug!(topic, "subscribed");
        }
    }
    let topic = gateway.config().topics.gateway_status.clone();
    if let Err(e) = client.publish(topic, QoS::AtLeastOnce, false, ONLINE).await {
        warn!("online status not published: {e}");
    }
}
