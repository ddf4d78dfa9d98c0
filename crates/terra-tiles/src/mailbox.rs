//! Worker-to-render-thread hand-off of finished tiles.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::synth::SynthesizedTile;

/// Single-slot hand-off from the worker to the render thread.
///
/// A newer tile replaces one the foreground has not collected yet.
#[derive(Clone, Default)]
pub(crate) struct Mailbox {
    slot: Arc<Mutex<Option<SynthesizedTile>>>,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store `tile`, returning the uncollected tile it displaced.
    pub(crate) fn put(&self, tile: SynthesizedTile) -> Option<SynthesizedTile> {
        self.lock().replace(tile)
    }

    pub(crate) fn take(&self) -> Option<SynthesizedTile> {
        self.lock().take()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    // The slot holds plain data, so a panic while locked leaves nothing half-written.
    fn lock(&self) -> MutexGuard<'_, Option<SynthesizedTile>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
