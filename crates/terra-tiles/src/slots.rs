//! Fixed pool of backend textures with least-recently-used eviction.

use rustc_hash::FxHashMap;
use terra_geo::TileKey;

use crate::backend::{TextureBackend, TextureHandle};

/// Slots held back for the base-level tiles.
pub const RESERVED_SLOTS: usize = 2;

/// Metadata for a resident tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileEntry {
    pub key: TileKey,
    /// Slot holding the texture.
    pub slot: usize,
    /// Sun longitude, in degrees, the texture was shaded for.
    pub sun_longitude: f64,
    /// Sun movement in degrees after which the texture is stale.
    pub stale_threshold: f64,
    /// Frame counter of the last lookup.
    pub last_used: u64,
}

#[derive(Default)]
struct Slot {
    handle: Option<TextureHandle>,
    entry: Option<TileEntry>,
}

/// Texture slots owned by the render thread.
///
/// Slot textures are created on first use and reused after eviction. The
/// first [`RESERVED_SLOTS`] slots only ever hold base tiles.
pub struct SlotPool {
    slots: Vec<Slot>,
    index: FxHashMap<TileKey, usize>,
    tile_size: u32,
}

/// Outcome of [`SlotPool::assign`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assignment {
    /// The tile was already resident; its texture is updated in place.
    Existing(TextureHandle),
    /// A free slot was taken.
    Fresh(TextureHandle),
    /// The least recently used tile was evicted to make room.
    Evicted {
        handle: TextureHandle,
        victim: TileKey,
    },
}

impl Assignment {
    pub fn handle(&self) -> TextureHandle {
        match *self {
            Assignment::Existing(h) | Assignment::Fresh(h) => h,
            Assignment::Evicted { handle, .. } => handle,
        }
    }
}

impl SlotPool {
    pub fn new(capacity: usize, tile_size: u32) -> Self {
        let capacity = capacity.max(RESERVED_SLOTS + 1);
        Self {
            slots: (0..capacity).map(|_| Slot::default()).collect(),
            index: FxHashMap::default(),
            tile_size,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn resident_count(&self) -> usize {
        self.index.len()
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn entry(&self, key: &TileKey) -> Option<&TileEntry> {
        self.index
            .get(key)
            .and_then(|&slot| self.slots[slot].entry.as_ref())
    }

    /// Mark `key` as used in `frame` and return its texture.
    pub fn touch(&mut self, key: &TileKey, frame: u64) -> Option<(TextureHandle, TileEntry)> {
        let &slot = self.index.get(key)?;
        let slot = &mut self.slots[slot];
        let entry = slot.entry.as_mut()?;
        entry.last_used = frame;
        Some((slot.handle?, *entry))
    }

    /// Find a slot for `key`, evicting when the pool is full.
    ///
    /// Returns `None` when every candidate slot holds a base tile.
    pub fn assign(
        &mut self,
        key: TileKey,
        backend: &mut dyn TextureBackend,
    ) -> Option<Assignment> {
        if let Some(&slot) = self.index.get(&key) {
            return self.slots[slot].handle.map(Assignment::Existing);
        }

        let candidates = if key.is_base() {
            0..self.slots.len()
        } else {
            RESERVED_SLOTS..self.slots.len()
        };

        let free = candidates
            .clone()
            .find(|&i| self.slots[i].entry.is_none());
        let (slot, victim) = match free {
            Some(slot) => (slot, None),
            None => {
                let (slot, victim) = candidates
                    .filter_map(|i| self.slots[i].entry.map(|e| (i, e)))
                    .filter(|(_, e)| !e.key.is_base())
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(i, e)| (i, e.key))?;
                self.index.remove(&victim);
                self.slots[slot].entry = None;
                (slot, Some(victim))
            }
        };

        let tile_size = self.tile_size;
        let handle = *self.slots[slot]
            .handle
            .get_or_insert_with(|| backend.create_texture(tile_size));
        Some(match victim {
            Some(victim) => Assignment::Evicted { handle, victim },
            None => Assignment::Fresh(handle),
        })
    }

    /// Record `entry` as resident in the slot [`assign`](Self::assign) chose.
    pub fn insert(&mut self, mut entry: TileEntry, handle: TextureHandle) {
        let Some(slot) = self.slots.iter().position(|s| s.handle == Some(handle)) else {
            tracing::warn!(?handle, "Texture handle does not belong to the slot pool");
            return;
        };
        entry.slot = slot;
        if let Some(previous) = self.slots[slot].entry.replace(entry)
            && previous.key != entry.key
        {
            self.index.remove(&previous.key);
        }
        self.index.insert(entry.key, slot);
    }

    /// Resident entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &TileEntry> {
        self.slots.iter().filter_map(|s| s.entry.as_ref())
    }
}
