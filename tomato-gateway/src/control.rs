//! Control surface operations, independent of the HTTP transport: status
//! query, manual command, mode change and image submission.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::alerts::AlertEmitter;
use crate::detection::Detector;
use crate::dispatcher::CommandDispatcher;
use crate::error::{ControlError, DetectionError};
use crate::models::{Actuator, ActuatorSet, DetectionResult, Mode, NodeLiveness, SensorSnapshot};
use crate::modes::ModeController;
use crate::state::StateStore;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub mode: Mode,
    pub sensors: SensorSnapshot,
    pub actuators: ActuatorSet<bool>,
    pub overrides: ActuatorSet<bool>,
    pub detection: Option<DetectionResult>,
    pub liveness: NodeLiveness,
    pub timestamp: String,
}

/// Operator request: any subset of the actuators with the wanted state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ManualCommand {
    pub pump: Option<bool>,
    pub fan: Option<bool>,
    pub light: Option<bool>,
}

impl ManualCommand {
    pub fn requested(&self) -> Vec<(Actuator, bool)> {
        [(Actuator::Pump, self.pump), (Actuator::Fan, self.fan), (Actuator::Light, self.light)]
            .into_iter()
            .filter_map(|(actuator, on)| on.map(|on| (actuator, on)))
            .collect()
    }
}

#[derive(Clone)]
pub struct ControlSurface {
    store: StateStore,
    modes: ModeController,
    dispatcher: CommandDispatcher,
    alerts: AlertEmitter,
    detector: Arc<dyn Detector>,
}

impl ControlSurface {
    pub fn new(
        store: StateStore,
        modes: ModeController,
        dispatcher: CommandDispatcher,
        alerts: AlertEmitter,
        detector: Arc<dyn Detector>,
    ) -> Self {
        Self { store, modes, dispatcher, alerts, detector }
    }

    pub fn status(&self) -> StatusReport {
        let state = self.store.get();
        StatusReport {
            mode: state.mode,
            sensors: state.sensors,
            actuators: state.actuators,
            overrides: state.overrides,
            detection: state.detection,
            liveness: state.liveness,
            timestamp: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        }
    }

    /// Refused as a whole in auto mode. Otherwise every requested actuator is
    /// attempted; failures are collected and reported together. The gates of
    /// the requested actuators are held from the mode guard to the last
    /// publish, so a policy command in flight finishes first and later ones
    /// see the pins.
    pub async fn manual_command(&self, command: &ManualCommand) -> Result<ActuatorSet<bool>, ControlError> {
        let requested = command.requested();
        let actuators: Vec<Actuator> = requested.iter().map(|(a, _)| *a).collect();
        let permit = self.dispatcher.gate().acquire(&actuators).await;
        let grant = self.modes.grant_manual(&permit, &actuators)?;

        let mut failed = Vec::new();
        for (actuator, on) in requested {
            if self.dispatcher.dispatch_held(&permit, actuator, on).await.is_err() {
                failed.push(actuator);
            }
        }
        drop(permit);
        info!(mode = %grant.mode, ?actuators, "manual command applied");

        if failed.is_empty() {
            Ok(self.store.read(|s| s.actuators))
        } else {
            Err(ControlError::CommandFailed(failed))
        }
    }

    /// Switches mode and announces it on the mode topic. The announcement is
    /// best effort; the local transition stands either way.
    pub async fn change_mode(&self, requested: Option<&str>) -> Result<Mode, ControlError> {
        let mode = requested
            .ok_or_else(|| ControlError::InvalidMode(String::new()))?
            .parse::<Mode>()
            .map_err(ControlError::InvalidMode)?;

        self.modes.transition_announced(mode).await;
        let topic = self.dispatcher.topics().mode.clone();
        if let Err(e) = self.dispatcher.publish_raw(&topic, mode.as_str().as_bytes().to_vec()).await {
            self.modes.forget_announcement(mode);
            warn!(%mode, "mode announcement not sent: {e}");
        }
        Ok(mode)
    }

    /// Runs the detector, stores the result and emits alerts. A failed
    /// detection leaves the previous result in place.
    pub async fn submit_image(&self, image: &[u8]) -> Result<DetectionResult, ControlError> {
        if image.is_empty() {
            return Err(DetectionError::EmptyImage.into());
        }
        info!(bytes = image.len(), "image received");
        let result = self.detector.detect(image).await?;

        self.store.update(|s| s.detection = Some(result.clone()));
        self.alerts.emit(&result).await;
        Ok(result)
    }
}
