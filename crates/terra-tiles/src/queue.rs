//! Bounded, coarsest-first request queue feeding the synthesis worker.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use terra_geo::TileKey;

/// Request queue shared with the worker through a bounded channel.
///
/// The foreground keeps its own receiver so it can reorder what the worker has
/// not yet taken: every push drains the channel, inserts, sorts coarser levels
/// first and sends back at most `capacity` keys. Keys that no longer fit are
/// returned to the caller.
pub struct RequestQueue {
    tx: Option<Sender<TileKey>>,
    rx: Receiver<TileKey>,
    capacity: usize,
}

impl RequestQueue {
    /// Create the queue and the receiver the worker consumes.
    pub fn new(capacity: usize) -> (Self, Receiver<TileKey>) {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        let queue = Self {
            tx: Some(tx),
            rx: rx.clone(),
            capacity,
        };
        (queue, rx)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueue `key`. Returns the keys dropped to stay within capacity, which
    /// may include `key` itself.
    pub fn push(&self, key: TileKey) -> Vec<TileKey> {
        let mut pending = self.drain();
        if !pending.contains(&key) {
            pending.push(key);
        }
        pending.sort_by_key(|k| (k.level, k.y, k.x));
        let dropped = pending.split_off(pending.len().min(self.capacity));
        let mut overflow = self.refill(pending);
        overflow.extend(dropped);
        overflow
    }

    /// Remove `key` if still queued.
    pub fn remove(&self, key: TileKey) {
        let mut pending = self.drain();
        pending.retain(|k| *k != key);
        for lost in self.refill(pending) {
            tracing::debug!(?lost, "Tile request lost while reordering queue");
        }
    }

    /// Keys waiting for the worker, coarsest first.
    pub fn snapshot(&self) -> Vec<TileKey> {
        let pending = self.drain();
        let snapshot = pending.clone();
        self.refill(pending);
        snapshot
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Disconnect the worker's receiver once it has drained what is left.
    /// Queued keys are discarded and returned.
    pub fn close(&mut self) -> Vec<TileKey> {
        let pending = self.drain();
        self.tx = None;
        pending
    }

    fn drain(&self) -> Vec<TileKey> {
        self.rx.try_iter().collect()
    }

    /// Send `keys` back in order, returning any that did not fit.
    fn refill(&self, keys: Vec<TileKey>) -> Vec<TileKey> {
        let Some(tx) = &self.tx else {
            return keys;
        };
        let mut rejected = Vec::new();
        for key in keys {
            match tx.try_send(key) {
                Ok(()) => {}
                Err(TrySendError::Full(k) | TrySendError::Disconnected(k)) => rejected.push(k),
            }
        }
        rejected
    }
}
