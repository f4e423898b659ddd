use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

#[derive(Debug, Serialize)]
pub struct GatewayHealth {
    pub uptime_seconds: u64,
    pub mqtt_status: LinkStatus,
    pub mqtt_reconnects: u32,
}

/// Pub/sub link bookkeeping, written by the MQTT loop and read by the API.
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<Mutex<LinkStatus>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(Mutex::new(LinkStatus::Connecting)),
        }
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = LinkStatus::Connected;
    }

    pub fn mark_mqtt_disconnected(&self) {
        *self.mqtt_status.lock() = LinkStatus::Disconnected;
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = LinkStatus::Reconnecting;
    }

    pub fn get_health(&self) -> GatewayHealth {
        GatewayHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            mqtt_status: *self.mqtt_status.lock(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }
}
