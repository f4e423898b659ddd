/**
 * GATEWAY - Composition root of the coordination engine
 *
 * ROLE: builds the state store, dispatcher, mode controller, policy engine
 * (and its worker), ingest router, alert emitter and control surface around
 * one `Publisher` and one `Detector`. Transports (MQTT, HTTP) only ever talk
 * to a `Gateway`.
 */

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::alerts::AlertEmitter;
use crate::config::GatewayConfig;
use crate::control::ControlSurface;
use crate::detection::Detector;
use crate::dispatcher::{CommandDispatcher, CommandGate, Publisher};
use crate::health::HealthTracker;
use crate::ingest::{IngestRouter, OFFLINE, ONLINE};
use crate::models::Actuator;
use crate::modes::ModeController;
use crate::policy::{PolicyEngine, PolicyTrigger, Thresholds};
use crate::state::StateStore;
use crate::watering::WateringTimer;

#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    store: StateStore,
    dispatcher: CommandDispatcher,
    modes: ModeController,
    policy: PolicyEngine,
    ingest: IngestRouter,
    control: ControlSurface,
    health: HealthTracker,
}

impl Gateway {
    /// Wires every component and spawns the policy worker. Must run inside a
    /// tokio runtime.
    pub fn start(config: GatewayConfig, publisher: Arc<dyn Publisher>, detector: Arc<dyn Detector>) -> (Self, JoinHandle<()>) {
        let topics = Arc::new(config.topics.clone());
        let store = StateStore::new(config.policy.initial_mode);
        let gate = CommandGate::new();
        let dispatcher = CommandDispatcher::new(publisher, store.clone(), topics.clone(), gate.clone());
        let modes = ModeController::new(store.clone(), gate);

        let watering = WateringTimer::new(dispatcher.clone(), config.policy.watering_duration());
        let policy = PolicyEngine::new(store.clone(), dispatcher.clone(), watering, Thresholds::from(&config.policy));
        let (trigger, rx) = PolicyTrigger::channel();
        let worker = policy.clone().spawn_worker(rx);

        let ingest = IngestRouter::new(topics, store.clone(), modes.clone(), trigger);
        let alerts = AlertEmitter::new(dispatcher.clone());
        let control = ControlSurface::new(store.clone(), modes.clone(), dispatcher.clone(), alerts, detector);

        info!(mode = %config.policy.initial_mode, "gateway started");
        let gateway = Self {
            config: Arc::new(config),
            store,
            dispatcher,
            modes,
            policy,
            ingest,
            control,
            health: HealthTracker::new(),
        };
        (gateway, worker)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn modes(&self) -> &ModeController {
        &self.modes
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn ingest(&self) -> &IngestRouter {
        &self.ingest
    }

    pub fn control(&self) -> &ControlSurface {
        &self.control
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    /// Publishes the gateway presence on its status topic.
    pub async fn announce_presence(&self, online: bool) {
        let topic = self.config.topics.gateway_status.clone();
        let payload = if online { ONLINE } else { OFFLINE };
        if let Err(e) = self.dispatcher.publish_raw(&topic, payload.as_bytes().to_vec()).await {
            warn!(payload, "presence not published: {e}");
        }
    }

    /// Halts the policy engine (pending watering timer included), switches
    /// every actuator off and announces `offline`. Sensor data arriving
    /// afterwards is still stored but never acted on.
    pub async fn shutdown(&self) {
        warn!("emergency shutdown, all actuators off");
        self.policy.halt();
        for actuator in Actuator::ALL {
            if let Err(e) = self.dispatcher.dispatch(actuator, false).await {
                warn!(%actuator, "could not switch off: {e}");
            }
        }
        self.announce_presence(false).await;
    }
}
