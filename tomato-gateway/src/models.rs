/**
 * MODELS - Data model shared by every gateway component
 *
 * ROLE: sensor readings, actuator belief, override pins, cooldowns, detection
 * results, node liveness and the operating mode. Everything here lives inside
 * the single `GatewayState` owned by the state store.
 */

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::time::Instant;

/// Remote actuators driven by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actuator {
    Pump,
    Fan,
    Light,
}

impl Actuator {
    pub const ALL: [Actuator; 3] = [Actuator::Pump, Actuator::Fan, Actuator::Light];

    pub fn as_str(self) -> &'static str {
        match self {
            Actuator::Pump => "pump",
            Actuator::Fan => "fan",
            Actuator::Light => "light",
        }
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating mode, process-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Operator drives every actuator, automation is off.
    Manual,
    /// Full automation, manual commands are refused.
    Auto,
    /// Automation with per-actuator operator pins.
    Hybrid,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Manual => "manual",
            Mode::Auto => "auto",
            Mode::Hybrid => "hybrid",
        }
    }

    /// True when the policy engine is allowed to act.
    pub fn is_automated(self) -> bool {
        !matches!(self, Mode::Manual)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Mode::Manual),
            "auto" => Ok(Mode::Auto),
            "hybrid" => Ok(Mode::Hybrid),
            other => Err(other.to_string()),
        }
    }
}

/// One value per actuator. Used for belief, override pins and cooldowns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActuatorSet<T> {
    pub pump: T,
    pub fan: T,
    pub light: T,
}

impl<T> ActuatorSet<T> {
    pub fn get(&self, actuator: Actuator) -> &T {
        match actuator {
            Actuator::Pump => &self.pump,
            Actuator::Fan => &self.fan,
            Actuator::Light => &self.light,
        }
    }

    pub fn get_mut(&mut self, actuator: Actuator) -> &mut T {
        match actuator {
            Actuator::Pump => &mut self.pump,
            Actuator::Fan => &mut self.fan,
            Actuator::Light => &mut self.light,
        }
    }

    pub fn set(&mut self, actuator: Actuator, value: T) {
        *self.get_mut(actuator) = value;
    }
}

impl ActuatorSet<bool> {
    pub fn any(&self) -> bool {
        self.pump || self.fan || self.light
    }
}

/// Latest known sensor readings. Field names on the wire follow the sensor
/// node payload (`temp`, `soil_temp`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorSnapshot {
    #[serde(rename = "temp")]
    pub air_temperature: Option<f64>,
    pub humidity: Option<f64>,
    #[serde(rename = "soil_temp")]
    pub soil_temperature: Option<f64>,
    #[serde(rename = "moisture")]
    pub soil_moisture: Option<f64>,
    #[serde(rename = "light")]
    pub light_level: Option<f64>,
    #[serde(rename = "timestamp", serialize_with = "rfc3339_opt")]
    pub updated_at: Option<OffsetDateTime>,
}

impl SensorSnapshot {
    /// Merges the fields present in `report`, leaves the others untouched.
    pub fn merge(&mut self, report: &SensorReport, at: OffsetDateTime) {
        fn keep(slot: &mut Option<f64>, incoming: Option<f64>) {
            if incoming.is_some() {
                *slot = incoming;
            }
        }
        keep(&mut self.air_temperature, report.temp);
        keep(&mut self.humidity, report.humidity);
        keep(&mut self.soil_temperature, report.soil_temp);
        keep(&mut self.soil_moisture, report.moisture);
        keep(&mut self.light_level, report.light);
        self.updated_at = Some(at);
    }
}

/// Sensor payload as sent by the sensor node. Every field is optional and a
/// JSON `null` counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SensorReport {
    #[serde(default)]
    pub temp: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub soil_temp: Option<f64>,
    #[serde(default)]
    pub moisture: Option<f64>,
    #[serde(default)]
    pub light: Option<f64>,
}

/// Output of the image detector. Only the latest value is kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub pest_detected: bool,
    pub disease_detected: bool,
    pub ripe_count: u32,
    pub confidence: f64,
    #[serde(serialize_with = "rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Remote nodes whose presence is reported on status topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Sensor,
    Camera,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Sensor => f.write_str("sensor node"),
            Node::Camera => f.write_str("camera node"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeLiveness {
    pub sensor_node: bool,
    pub camera_node: bool,
}

impl NodeLiveness {
    pub fn set(&mut self, node: Node, online: bool) {
        match node {
            Node::Sensor => self.sensor_node = online,
            Node::Camera => self.camera_node = online,
        }
    }
}

/// The whole gateway belief. Only the state store hands out copies of it.
#[derive(Debug, Clone)]
pub struct GatewayState {
    pub mode: Mode,
    /// Bumped on every mode transition; decisions computed under an older
    /// epoch are discarded.
    pub mode_epoch: u64,
    pub sensors: SensorSnapshot,
    pub actuators: ActuatorSet<bool>,
    pub overrides: ActuatorSet<bool>,
    pub cooldowns: ActuatorSet<Option<Instant>>,
    pub detection: Option<DetectionResult>,
    pub liveness: NodeLiveness,
}

impl GatewayState {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            mode_epoch: 0,
            sensors: SensorSnapshot::default(),
            actuators: ActuatorSet::default(),
            overrides: ActuatorSet::default(),
            cooldowns: ActuatorSet::default(),
            detection: None,
            liveness: NodeLiveness::default(),
        }
    }
}

fn rfc3339<S: Serializer>(at: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    let text = at.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&text)
}

fn rfc3339_opt<S: Serializer>(at: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error> {
    match at {
        Some(at) => rfc3339(at, serializer),
        None => serializer.serialize_none(),
    }
}
