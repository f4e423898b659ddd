//! Command dispatcher: the only writer of outbound actuator commands.
//!
//! Belief is optimistic. It follows the command on a successful publish and
//! stays put on failure; there is no acknowledgement from the node.
//!
//! Every command runs under its actuator's gate, from the last check to the
//! belief update. Pins and mode transitions take the same gates, so they
//! wait for an in-flight command instead of racing it. The gates are apart
//! from the store lock: a stuck publish never blocks store readers.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::Topics;
use crate::error::PublishError;
use crate::models::{Actuator, ActuatorSet, GatewayState};
use crate::state::StateStore;

/// Topic-addressed, fire-and-forget message delivery.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}

pub fn command_payload(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// One async lock per actuator.
#[derive(Clone, Default)]
pub struct CommandGate {
    locks: Arc<ActuatorSet<Arc<Mutex<()>>>>,
}

impl CommandGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the gates of `actuators`, always in pump, fan, light order.
    pub async fn acquire(&self, actuators: &[Actuator]) -> CommandPermit {
        let mut guards = Vec::with_capacity(actuators.len());
        for actuator in Actuator::ALL {
            if actuators.contains(&actuator) {
                let guard = self.locks.get(actuator).clone().lock_owned().await;
                guards.push((actuator, guard));
            }
        }
        CommandPermit { guards }
    }

    pub async fn acquire_all(&self) -> CommandPermit {
        self.acquire(&Actuator::ALL).await
    }
}

/// Held gates; released on drop.
pub struct CommandPermit {
    guards: Vec<(Actuator, OwnedMutexGuard<()>)>,
}

impl CommandPermit {
    pub fn covers(&self, actuator: Actuator) -> bool {
        self.guards.iter().any(|(a, _)| *a == actuator)
    }
}

#[derive(Clone)]
pub struct CommandDispatcher {
    publisher: Arc<dyn Publisher>,
    store: StateStore,
    topics: Arc<Topics>,
    gate: CommandGate,
}

impl CommandDispatcher {
    pub fn new(publisher: Arc<dyn Publisher>, store: StateStore, topics: Arc<Topics>, gate: CommandGate) -> Self {
        Self { publisher, store, topics, gate }
    }

    pub fn gate(&self) -> &CommandGate {
        &self.gate
    }

    /// Publishes `on`/`off` on the actuator topic under its gate, then
    /// records the belief.
    pub async fn dispatch(&self, actuator: Actuator, on: bool) -> Result<(), PublishError> {
        let _permit = self.gate.acquire(&[actuator]).await;
        self.send(actuator, on).await
    }

    /// Like `dispatch`, but `still_wanted` is checked against the current
    /// state once the gate is held. `Ok(false)` means nothing was sent.
    pub async fn dispatch_if(
        &self,
        actuator: Actuator,
        on: bool,
        still_wanted: impl FnOnce(&GatewayState) -> bool,
    ) -> Result<bool, PublishError> {
        let _permit = self.gate.acquire(&[actuator]).await;
        if !self.store.read(still_wanted) {
            debug!(%actuator, "command superseded before dispatch");
            return Ok(false);
        }
        self.send(actuator, on).await.map(|()| true)
    }

    /// Dispatch for a caller already holding the actuator's gate.
    pub async fn dispatch_held(&self, permit: &CommandPermit, actuator: Actuator, on: bool) -> Result<(), PublishError> {
        debug_assert!(permit.covers(actuator), "{actuator} gate not held");
        self.send(actuator, on).await
    }

    async fn send(&self, actuator: Actuator, on: bool) -> Result<(), PublishError> {
        let topic = self.topics.control(actuator);
        let command = command_payload(on);
        if let Err(e) = self.publisher.publish(topic, command.as_bytes().to_vec()).await {
            warn!(%actuator, command, "command not sent: {e}");
            return Err(e);
        }
        self.store.update(|s| s.actuators.set(actuator, on));
        info!(%actuator, command, "command sent");
        Ok(())
    }

    /// Raw publish for non-actuator traffic (alerts, mode and presence announcements).
    pub async fn publish_raw(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        self.publisher.publish(topic, payload).await
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }
}
