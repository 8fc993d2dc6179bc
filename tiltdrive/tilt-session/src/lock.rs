use std::sync::Arc;

use crossbeam::atomic::AtomicCell;

/// The deadman gate. Motion is only ever commanded while this is unlocked.
///
/// Clones share the same cell, so the UI side can flip it while the sensor
/// path reads it. Starts locked.
#[derive(Clone, Debug)]
pub struct LockState(Arc<AtomicCell<bool>>);

impl Default for LockState {
    fn default() -> Self {
        Self(Arc::new(AtomicCell::new(true)))
    }
}

impl LockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.0.load()
    }

    pub fn set(&self, locked: bool) {
        self.0.store(locked);
    }

    pub fn lock(&self) {
        self.set(true);
    }

    pub fn unlock(&self) {
        self.set(false);
    }

    /// Holding the deadman control unlocks, releasing it locks.
    pub fn deadman(&self, pressed: bool) {
        self.set(!pressed);
    }
}
