//! The foreground half of the tile cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, unbounded};
use rustc_hash::FxHashSet;
use terra_geo::{BASE_TILE_LEVEL, MAX_TILE_LEVEL, PlanetShape, TileDataSource, TileKey};

use crate::backend::{TextureBackend, TextureHandle};
use crate::error::TileCacheError;
use crate::mailbox::Mailbox;
use crate::queue::RequestQueue;
use crate::slots::{Assignment, RESERVED_SLOTS, SlotPool, TileEntry};
use crate::synth::{ShadingTables, SynthesisParams, SynthesizedTile, is_stale, synthesize};
use crate::worker::{self, ReleaseReason, Released, WorkerContext};

/// Construction parameters for [`TileCache`].
#[derive(Clone, Debug, PartialEq)]
pub struct TileCacheParams {
    /// Texels per tile edge.
    pub tile_size: u32,
    /// Texture slots, including the two reserved for base tiles.
    pub slot_capacity: usize,
    /// Pending requests kept before the finest are dropped.
    pub queue_capacity: usize,
    /// Finer requests are clamped to this level.
    pub max_level: u8,
    /// Sun movement at the equator, in degrees, before a tile is stale.
    pub stale_sun_degrees: f64,
    /// Initial sun longitude, in degrees.
    pub sun_longitude: f64,
    /// Elevation ratio of the ocean surface.
    pub sea_level: f64,
}

impl Default for TileCacheParams {
    fn default() -> Self {
        Self {
            tile_size: 256,
            slot_capacity: 64,
            queue_capacity: 2,
            max_level: 18,
            stale_sun_degrees: 10.0,
            sun_longitude: 0.0,
            sea_level: 0.45,
        }
    }
}

/// Running counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileCacheStats {
    /// Lookups answered at the requested level.
    pub hits: u64,
    /// Lookups answered by an ancestor.
    pub misses: u64,
    /// Textures uploaded to the backend, base tiles included.
    pub commits: u64,
    pub evictions: u64,
    /// Requests pushed out of the full queue.
    pub dropped: u64,
    /// Finished tiles overwritten before they were committed.
    pub superseded: u64,
    /// Requests whose synthesis failed.
    pub failures: u64,
}

/// Multi-resolution surface texture cache.
///
/// Owned by the render thread. Lookups never block: a missing tile is queued for
/// the worker and the nearest resident ancestor answers in the meantime.
pub struct TileCache {
    params: TileCacheParams,
    queue: RequestQueue,
    mailbox: Mailbox,
    released: Receiver<Released>,
    slots: SlotPool,
    /// Keys queued, being synthesised or waiting in the mailbox.
    requested: FxHashSet<TileKey>,
    sun_longitude: Arc<AtomicU64>,
    frame: u64,
    stats: TileCacheStats,
    worker: Option<JoinHandle<()>>,
}

impl TileCache {
    /// Synthesise the base tiles into their reserved slots and start the worker.
    pub fn new(
        params: TileCacheParams,
        shape: &PlanetShape,
        source: Arc<dyn TileDataSource>,
        backend: &mut dyn TextureBackend,
    ) -> Result<Self, TileCacheError> {
        if params.tile_size < 2 {
            return Err(TileCacheError::InvalidParams(format!(
                "tile_size {} is below 2",
                params.tile_size
            )));
        }
        if params.slot_capacity <= RESERVED_SLOTS {
            return Err(TileCacheError::InvalidParams(format!(
                "slot_capacity {} leaves no slot beside the base tiles",
                params.slot_capacity
            )));
        }
        if !(BASE_TILE_LEVEL..=MAX_TILE_LEVEL).contains(&params.max_level) {
            return Err(TileCacheError::InvalidParams(format!(
                "max_level {} outside {BASE_TILE_LEVEL}..={MAX_TILE_LEVEL}",
                params.max_level
            )));
        }

        let synth = SynthesisParams {
            tile_size: params.tile_size,
            stale_sun_degrees: params.stale_sun_degrees,
            min_radius: shape.min_radius,
            relief: shape.relief(),
            sea_level: params.sea_level,
        };
        let tables = Arc::new(ShadingTables::new(params.sea_level));
        let sun_longitude = Arc::new(AtomicU64::new(params.sun_longitude.to_bits()));
        let (queue, requests) = RequestQueue::new(params.queue_capacity);
        let (released_tx, released) = unbounded();
        let mailbox = Mailbox::new();

        let mut cache = Self {
            slots: SlotPool::new(params.slot_capacity, params.tile_size),
            params,
            queue,
            mailbox: mailbox.clone(),
            released,
            requested: FxHashSet::default(),
            sun_longitude: Arc::clone(&sun_longitude),
            frame: 0,
            stats: TileCacheStats::default(),
            worker: None,
        };

        for key in TileKey::base_tiles() {
            let tile = synthesize(
                source.as_ref(),
                key,
                &synth,
                cache.params.sun_longitude,
                &tables,
            )
            .map_err(|source| TileCacheError::BaseTile { key, source })?;
            cache.commit(tile, backend);
        }

        let ctx = WorkerContext {
            source,
            params: synth,
            tables,
            sun_longitude,
            mailbox,
            released: released_tx,
        };
        cache.worker = Some(worker::spawn(requests, ctx).map_err(TileCacheError::Spawn)?);

        tracing::info!(
            tile_size = cache.params.tile_size,
            slots = cache.params.slot_capacity,
            max_level = cache.params.max_level,
            "Tile cache ready"
        );
        Ok(cache)
    }

    pub fn params(&self) -> &TileCacheParams {
        &self.params
    }

    /// Texture for `key`, or for its nearest resident ancestor.
    ///
    /// `key` is rewritten to the tile actually returned so callers can map
    /// their texture coordinates into it. Missing levels on the way up are
    /// requested; a stale hit is requested again but still returned. Returns
    /// `None` only for keys outside the tile grid.
    pub fn texture_handle(&mut self, key: &mut TileKey) -> Option<TextureHandle> {
        if !key.is_valid() {
            return None;
        }
        while key.level > self.params.max_level {
            *key = key.parent()?;
        }

        let sun = self.sun_longitude();
        let mut exact = true;
        loop {
            if let Some((handle, entry)) = self.slots.touch(key, self.frame) {
                if exact {
                    self.stats.hits += 1;
                }
                if is_stale(entry.sun_longitude, entry.stale_threshold, sun) {
                    self.request(*key);
                }
                return Some(handle);
            }
            if exact {
                self.stats.misses += 1;
                exact = false;
            }
            self.request(*key);
            *key = key.parent()?;
        }
    }

    /// Whether `key` is resident. Queues it when it is not.
    pub fn has_texture_cached(&mut self, key: TileKey) -> bool {
        if self.slots.contains(&key) {
            return true;
        }
        self.request(key);
        false
    }

    /// Queue `key` for synthesis. Returns whether it is now pending.
    pub fn request(&mut self, key: TileKey) -> bool {
        if !key.is_valid() || self.queue.is_closed() {
            return false;
        }
        if !self.requested.insert(key) {
            return true;
        }
        for dropped in self.queue.push(key) {
            tracing::trace!(?dropped, "Tile request dropped");
            self.requested.remove(&dropped);
            self.stats.dropped += 1;
        }
        self.requested.contains(&key)
    }

    /// Advance one frame and commit at most one finished tile.
    ///
    /// Returns the key that became resident, if any.
    pub fn update(&mut self, backend: &mut dyn TextureBackend) -> Option<TileKey> {
        self.frame += 1;

        for released in self.released.try_iter() {
            self.requested.remove(&released.key);
            match released.reason {
                ReleaseReason::Superseded => self.stats.superseded += 1,
                ReleaseReason::Failed => self.stats.failures += 1,
            }
        }

        let tile = self.mailbox.take()?;
        self.requested.remove(&tile.key);
        self.queue.remove(tile.key);
        self.commit(tile, backend)
    }

    fn commit(
        &mut self,
        tile: SynthesizedTile,
        backend: &mut dyn TextureBackend,
    ) -> Option<TileKey> {
        let Some(assignment) = self.slots.assign(tile.key, backend) else {
            tracing::warn!(key = ?tile.key, "No evictable texture slot, tile discarded");
            return None;
        };
        if let Assignment::Evicted { victim, .. } = assignment {
            tracing::debug!(?victim, incoming = ?tile.key, "Evicted tile texture");
            self.stats.evictions += 1;
        }

        let handle = assignment.handle();
        backend.update_texture(handle, tile.size, &tile.rgba);
        self.slots.insert(
            TileEntry {
                key: tile.key,
                slot: 0,
                sun_longitude: tile.sun_longitude,
                stale_threshold: tile.stale_threshold,
                last_used: self.frame,
            },
            handle,
        );
        self.stats.commits += 1;
        tracing::debug!(key = ?tile.key, ?handle, "Committed tile texture");
        Some(tile.key)
    }

    /// Sun longitude, in degrees, new tiles are shaded for.
    pub fn sun_longitude(&self) -> f64 {
        f64::from_bits(self.sun_longitude.load(Ordering::Relaxed))
    }

    pub fn set_sun_longitude(&mut self, degrees: f64) {
        self.sun_longitude
            .store(degrees.rem_euclid(360.0).to_bits(), Ordering::Relaxed);
    }

    pub fn entry(&self, key: &TileKey) -> Option<&TileEntry> {
        self.slots.entry(key)
    }

    /// Whether `key` is queued, being synthesised or awaiting commit.
    pub fn is_requested(&self, key: &TileKey) -> bool {
        self.requested.contains(key)
    }

    pub fn requested_count(&self) -> usize {
        self.requested.len()
    }

    /// Keys still waiting for the worker, coarsest first.
    pub fn pending_requests(&self) -> Vec<TileKey> {
        self.queue.snapshot()
    }

    pub fn resident_count(&self) -> usize {
        self.slots.resident_count()
    }

    pub fn stats(&self) -> TileCacheStats {
        self.stats
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Stop accepting requests and wait for the worker to finish its current tile.
    pub fn close(&mut self) {
        for key in self.queue.close() {
            self.requested.remove(&key);
        }
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::warn!("Tile synthesis worker exited abnormally");
            }
            tracing::debug!("Tile cache closed");
        }
    }
}

impl Drop for TileCache {
    fn drop(&mut self) {
        self.close();
    }
}
