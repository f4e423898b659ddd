/**
 * POLICY ENGINE - Threshold, hysteresis and cooldown automation
 *
 * ROLE: decide, per actuator, whether the current readings call for a state
 * change, and hand the decision to the command dispatcher.
 *
 * OPERATION:
 * - `plan` is pure: one snapshot in, a list of decisions out
 * - `evaluate` re-validates each decision under the actuator's command gate
 *   right before publishing (same mode epoch, still automated, not pinned,
 *   still needed); pins and mode changes wait for that gate
 * - `halt` stops all further decisions (shutdown)
 * - the worker consumes snapshots from a watch channel, so ingestion never
 *   waits for a decision and a burst of readings collapses to the latest
 *
 * RULES:
 * - nothing happens in manual mode or without both temperature and moisture
 * - light: on while light < threshold, fan: on while temp > threshold,
 *   commands only when the wanted state differs from the belief
 * - pump: moisture < threshold and cooldown elapsed, cooldown counted from
 *   activation, off scheduled on the watering timer
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PolicyConf;
use crate::dispatcher::CommandDispatcher;
use crate::models::{Actuator, GatewayState};
use crate::state::StateStore;
use crate::watering::WateringTimer;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub moisture: f64,
    pub temperature: f64,
    pub light: f64,
    pub watering_cooldown: Duration,
}

impl From<&PolicyConf> for Thresholds {
    fn from(conf: &PolicyConf) -> Self {
        Self {
            moisture: conf.moisture_threshold,
            temperature: conf.temp_threshold,
            light: conf.light_threshold,
            watering_cooldown: conf.watering_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Drive a hysteresis actuator (light, fan) to `on`.
    Switch { actuator: Actuator, on: bool, reading: f64 },
    /// Start an irrigation cycle.
    Water { moisture: f64 },
}

pub fn cooldown_elapsed(last: Option<Instant>, now: Instant, cooldown: Duration) -> bool {
    last.map_or(true, |t| now.saturating_duration_since(t) >= cooldown)
}

/// Decisions warranted by `state` at `now`, in light, pump, fan order.
pub fn plan(state: &GatewayState, thresholds: &Thresholds, now: Instant) -> Vec<Decision> {
    let mut decisions = Vec::new();
    if !state.mode.is_automated() {
        return decisions;
    }
    let sensors = &state.sensors;
    let (Some(temp), Some(moisture)) = (sensors.air_temperature, sensors.soil_moisture) else {
        return decisions;
    };

    let mut switch = |actuator: Actuator, wanted: bool, reading: f64| {
        if wanted != *state.actuators.get(actuator) && !*state.overrides.get(actuator) {
            decisions.push(Decision::Switch { actuator, on: wanted, reading });
        }
    };

    if let Some(light) = sensors.light_level {
        switch(Actuator::Light, light < thresholds.light, light);
    }

    let fan_wanted = temp > thresholds.temperature;

    if moisture < thresholds.moisture
        && !state.overrides.pump
        && cooldown_elapsed(state.cooldowns.pump, now, thresholds.watering_cooldown)
    {
        decisions.push(Decision::Water { moisture });
    }

    if fan_wanted != state.actuators.fan && !state.overrides.fan {
        decisions.push(Decision::Switch { actuator: Actuator::Fan, on: fan_wanted, reading: temp });
    }

    decisions
}

/// Feeds the policy worker with freshly updated snapshots.
#[derive(Clone)]
pub struct PolicyTrigger {
    tx: watch::Sender<Option<GatewayState>>,
}

impl PolicyTrigger {
    pub fn channel() -> (Self, watch::Receiver<Option<GatewayState>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    /// Never blocks; an unread snapshot is replaced by the newer one.
    pub fn fire(&self, snapshot: GatewayState) {
        self.tx.send_replace(Some(snapshot));
    }
}

#[derive(Clone)]
pub struct PolicyEngine {
    store: StateStore,
    dispatcher: CommandDispatcher,
    watering: WateringTimer,
    thresholds: Thresholds,
    halted: Arc<AtomicBool>,
}

impl PolicyEngine {
    pub fn new(store: StateStore, dispatcher: CommandDispatcher, watering: WateringTimer, thresholds: Thresholds) -> Self {
        Self { store, dispatcher, watering, thresholds, halted: Arc::new(AtomicBool::new(false)) }
    }

    pub fn watering(&self) -> &WateringTimer {
        &self.watering
    }

    /// No decision is sent after this returns, including ones already
    /// planned. Cannot be undone.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        self.watering.cancel();
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Runs one cycle on `snapshot`. Returns the number of commands sent.
    pub async fn evaluate(&self, snapshot: &GatewayState) -> usize {
        if self.is_halted() {
            return 0;
        }
        let now = Instant::now();
        let epoch = snapshot.mode_epoch;
        let mut sent = 0;

        for decision in plan(snapshot, &self.thresholds, now) {
            match decision {
                Decision::Switch { actuator, on, reading } => {
                    let dispatched = self
                        .dispatcher
                        .dispatch_if(actuator, on, |s| {
                            !self.is_halted()
                                && s.mode_epoch == epoch
                                && s.mode.is_automated()
                                && !*s.overrides.get(actuator)
                                && *s.actuators.get(actuator) != on
                        })
                        .await;
                    if let Ok(true) = dispatched {
                        info!(%actuator, on, reading, "policy switched actuator");
                        sent += 1;
                    }
                }
                Decision::Water { moisture } => {
                    if self.start_watering(epoch, now, moisture).await {
                        sent += 1;
                    }
                }
            }
        }
        sent
    }

    async fn start_watering(&self, epoch: u64, now: Instant, moisture: f64) -> bool {
        let permit = self.dispatcher.gate().acquire(&[Actuator::Pump]).await;
        let cooldown = self.thresholds.watering_cooldown;
        let reserved = self.store.update(|s| {
            let allowed = !self.is_halted()
                && s.mode_epoch == epoch
                && s.mode.is_automated()
                && !s.overrides.pump
                && cooldown_elapsed(s.cooldowns.pump, now, cooldown);
            allowed.then(|| s.cooldowns.pump.replace(now))
        });
        let Some(previous) = reserved else {
            debug!("watering superseded before dispatch");
            return false;
        };

        info!(moisture, "soil dry, watering");
        match self.dispatcher.dispatch_held(&permit, Actuator::Pump, true).await {
            Ok(()) => {
                self.watering.arm();
                true
            }
            Err(_) => {
                self.store.update(|s| {
                    if s.cooldowns.pump == Some(now) {
                        s.cooldowns.pump = previous;
                    }
                });
                warn!("pump on not sent, cooldown released for the next cycle");
                false
            }
        }
    }

    /// Evaluates every snapshot published on `rx` until the sender is dropped.
    pub fn spawn_worker(self, mut rx: watch::Receiver<Option<GatewayState>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    self.evaluate(&snapshot).await;
                }
            }
            debug!("policy worker stopped");
        })
    }
}
