use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::models::{Actuator, Mode};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub mqtt: MqttConf,
    pub topics: Topics,
    pub policy: PolicyConf,
    pub http: HttpConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub publish_timeout_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// Consecutive failed connection attempts before giving up; unbounded when absent.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "tomato-gateway".into(),
            keep_alive_secs: 15,
            publish_timeout_ms: 2000,
            reconnect_initial_ms: 1000,
            reconnect_max_ms: 30_000,
            max_reconnect_attempts: None,
        }
    }
}

/// Topic names, inbound and outbound.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Topics {
    pub sensors: String,
    pub sensor_status: String,
    pub camera_status: String,
    pub mode: String,
    pub pump: String,
    pub fan: String,
    pub light: String,
    pub alert: String,
    pub gateway_status: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            sensors: "tomato/sensors/data".into(),
            sensor_status: "tomato/esp32/status".into(),
            camera_status: "tomato/camera/status".into(),
            mode: "tomato/system/mode".into(),
            pump: "tomato/pump/control".into(),
            fan: "tomato/fan/control".into(),
            light: "tomato/growlight/control".into(),
            alert: "tomato/alert".into(),
            gateway_status: "tomato/raspi/status".into(),
        }
    }
}

impl Topics {
    pub fn control(&self, actuator: Actuator) -> &str {
        match actuator {
            Actuator::Pump => &self.pump,
            Actuator::Fan => &self.fan,
            Actuator::Light => &self.light,
        }
    }

    /// Topics the gateway subscribes to.
    pub fn inbound(&self) -> [&str; 4] {
        [&self.sensors, &self.sensor_status, &self.camera_status, &self.mode]
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PolicyConf {
    /// Soil moisture (%) under which irrigation starts.
    pub moisture_threshold: f64,
    /// Air temperature (°C) above which the fan runs.
    pub temp_threshold: f64,
    /// Light level (%) under which the grow light runs.
    pub light_threshold: f64,
    pub watering_cooldown_secs: u64,
    pub watering_duration_ms: u64,
    pub initial_mode: Mode,
}

impl Default for PolicyConf {
    fn default() -> Self {
        Self {
            moisture_threshold: 30.0,
            temp_threshold: 30.0,
            light_threshold: 40.0,
            watering_cooldown_secs: 30,
            watering_duration_ms: 2000,
            initial_mode: Mode::Auto,
        }
    }
}

impl PolicyConf {
    pub fn watering_cooldown(&self) -> Duration {
        Duration::from_secs(self.watering_cooldown_secs)
    }

    pub fn watering_duration(&self) -> Duration {
        Duration::from_millis(self.watering_duration_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
    pub max_image_bytes: usize,
    /// When set, every route but `/health` requires a matching `x-api-key`.
    pub api_key: Option<String>,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".into(),
            max_image_bytes: 8 * 1024 * 1024,
            api_key: None,
        }
    }
}

/// Parses a YAML document; an empty document yields the defaults.
pub fn parse_config(txt: &str) -> Result<GatewayConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(GatewayConfig::default());
    }
    Ok(serde_yaml::from_str(txt)?)
}

async fn read_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let txt = fs::read_to_string(path).await?;
    parse_config(&txt)
}

pub async fn load_config() -> GatewayConfig {
    let path = std::env::var("TOMATO_GATEWAY_CONFIG").unwrap_or_else(|_| "gateway.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        read_config(Path::new(&path)).await.unwrap_or_else(|e| {
            warn!("{path}: {e}, using defaults");
            GatewayConfig::default()
        })
    } else {
        info!("no {path}, using default config");
        GatewayConfig::default()
    };
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg
}

fn apply_env_overrides(cfg: &mut GatewayConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("TOMATO_MQTT_HOST") {
        cfg.mqtt.host = host;
    }
    if let Some(port) = var("TOMATO_MQTT_PORT") {
        match port.parse() {
            Ok(port) => cfg.mqtt.port = port,
            Err(_) => warn!("ignoring TOMATO_MQTT_PORT={port}"),
        }
    }
    if let Some(bind) = var("TOMATO_HTTP_BIND") {
        cfg.http.bind = bind;
    }
    if let Some(key) = var("TOMATO_GATEWAY_API_KEY").filter(|k| !k.is_empty()) {
        cfg.http.api_key = Some(key);
    }
}
