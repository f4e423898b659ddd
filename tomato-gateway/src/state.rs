use parking_lot::Mutex;
use std::sync::Arc;

use crate::models::{GatewayState, Mode};

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Single owner of the gateway state. Readers get copies, writers go through
/// `update`, which runs one read-modify-write under the lock. Never hold the
/// lock across an `.await`.
#[derive(Clone)]
pub struct StateStore {
    inner: Shared<GatewayState>,
}

impl StateStore {
    pub fn new(mode: Mode) -> Self {
        Self { inner: new_state(GatewayState::new(mode)) }
    }

    /// Consistent copy of the whole state.
    pub fn get(&self) -> GatewayState {
        self.inner.lock().clone()
    }

    /// Applies `mutator` atomically and returns what it returns.
    pub fn update<R>(&self, mutator: impl FnOnce(&mut GatewayState) -> R) -> R {
        let mut guard = self.inner.lock();
        mutator(&mut guard)
    }

    /// Reads a projection without cloning the whole state.
    pub fn read<R>(&self, reader: impl FnOnce(&GatewayState) -> R) -> R {
        reader(&self.inner.lock())
    }
}
