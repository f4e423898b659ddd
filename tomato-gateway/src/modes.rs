//! Mode controller: manual / auto / hybrid and the override pin lifecycle.
//!
//! Any mode reaches any other mode in one step, and every transition clears
//! all override pins in the same critical section that switches the mode.
//! Transitions hold every command gate, so they never land in the middle of
//! an actuator command.
//!
//! A mode set here is also announced on the mode topic, which the gateway
//! itself subscribes to. The first matching message that comes back is
//! recognised as that echo and ignored; any other mode message is a real
//! transition and clears the pins.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::dispatcher::{CommandGate, CommandPermit};
use crate::error::ControlError;
use crate::models::{Actuator, ActuatorSet, Mode};
use crate::state::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: Mode,
    pub to: Mode,
    pub epoch: u64,
}

/// Outcome of the mode guard for a manual command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualGrant {
    pub mode: Mode,
    pub epoch: u64,
}

#[derive(Clone)]
pub struct ModeController {
    store: StateStore,
    gate: CommandGate,
    expected_echo: Arc<Mutex<Option<Mode>>>,
}

impl ModeController {
    pub fn new(store: StateStore, gate: CommandGate) -> Self {
        Self { store, gate, expected_echo: Arc::new(Mutex::new(None)) }
    }

    pub fn current(&self) -> Mode {
        self.store.read(|s| s.mode)
    }

    /// Transition requested through the control surface, to be announced on
    /// the mode topic by the caller.
    pub async fn transition_announced(&self, to: Mode) -> ModeTransition {
        let _permit = self.gate.acquire_all().await;
        *self.expected_echo.lock() = Some(to);
        self.switch(to)
    }

    /// The announcement never left; a later message for the same mode is a
    /// real request.
    pub fn forget_announcement(&self, mode: Mode) {
        let mut expected = self.expected_echo.lock();
        if *expected == Some(mode) {
            *expected = None;
        }
    }

    /// Mode message from the pub/sub side. Returns `None` for the echo of our
    /// own announcement.
    pub async fn apply_remote(&self, to: Mode) -> Option<ModeTransition> {
        let _permit = self.gate.acquire_all().await;
        let echo = self.expected_echo.lock().take();
        if echo == Some(to) && self.current() == to {
            debug!(mode = %to, "own mode announcement came back, pins kept");
            return None;
        }
        Some(self.switch(to))
    }

    fn switch(&self, to: Mode) -> ModeTransition {
        let transition = self.store.update(|s| {
            let from = s.mode;
            s.mode = to;
            s.mode_epoch += 1;
            s.overrides = ActuatorSet::default();
            ModeTransition { from, to, epoch: s.mode_epoch }
        });
        info!(from = %transition.from, to = %transition.to, "mode changed, overrides cleared");
        transition
    }

    /// Mode guard for a manual command, taken while the caller holds the
    /// gates of the requested actuators. Refused in auto mode; in hybrid mode
    /// the actuators are pinned before anything is published.
    pub fn grant_manual(&self, permit: &CommandPermit, actuators: &[Actuator]) -> Result<ManualGrant, ControlError> {
        self.store.update(|s| match s.mode {
            Mode::Auto => Err(ControlError::ModeForbids(Mode::Auto)),
            Mode::Manual => Ok(ManualGrant { mode: Mode::Manual, epoch: s.mode_epoch }),
            Mode::Hybrid => {
                for &actuator in actuators.iter().filter(|a| permit.covers(**a)) {
                    s.overrides.set(actuator, true);
                }
                Ok(ManualGrant { mode: Mode::Hybrid, epoch: s.mode_epoch })
            }
        })
    }
}
