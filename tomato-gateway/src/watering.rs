//! Deferred pump-off.
//!
//! Arming spawns a timer task that sends the pump "off" after the watering
//! duration. The off fires whatever the mode or override pins say by then.
//! Re-arming replaces the pending timer; `cancel` drops it (shutdown path).

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::dispatcher::CommandDispatcher;
use crate::models::Actuator;

const OFF_ATTEMPTS: u32 = 3;
const OFF_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct WateringTimer {
    dispatcher: CommandDispatcher,
    duration: Duration,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl WateringTimer {
    pub fn new(dispatcher: CommandDispatcher, duration: Duration) -> Self {
        Self { dispatcher, duration, pending: Arc::new(Mutex::new(None)) }
    }

    pub fn arm(&self) {
        let dispatcher = self.dispatcher.clone();
        let duration = self.duration;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            for attempt in 1..=OFF_ATTEMPTS {
                match dispatcher.dispatch(Actuator::Pump, false).await {
                    Ok(()) => return,
                    Err(e) if attempt < OFF_ATTEMPTS => {
                        warn!(attempt, "pump off failed: {e}, retrying");
                        tokio::time::sleep(OFF_RETRY_DELAY).await;
                    }
                    Err(e) => error!("pump off failed after {OFF_ATTEMPTS} attempts, pump may still be running: {e}"),
                }
            }
        });
        if let Some(previous) = self.pending.lock().replace(handle) {
            if !previous.is_finished() {
                debug!("re-arming watering timer");
                previous.abort();
            }
        }
    }

    /// Drops the pending off, if any. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}
