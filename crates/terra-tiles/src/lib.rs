//! Surface texture cache with a background synthesis worker.
//!
//! Tiles move through `absent → queued → generating → pending → resident`.
//! The render thread asks for a tile with [`TileCache::texture_handle`] and
//! always gets an answer immediately, falling back to the nearest resident
//! ancestor. One worker thread turns raw samples into shaded RGBA; at most one
//! finished tile is committed to the texture backend per [`TileCache::update`].

mod backend;
mod cache;
mod error;
mod mailbox;
mod queue;
mod slots;
mod synth;
mod worker;

pub use backend::{TextureBackend, TextureHandle};
pub use cache::{TileCache, TileCacheParams, TileCacheStats};
pub use error::TileCacheError;
pub use queue::RequestQueue;
pub use slots::{Assignment, RESERVED_SLOTS, SlotPool, TileEntry};
pub use synth::{
    ShadingTables, SynthesisParams, SynthesizedTile, is_stale, stale_threshold, synthesize,
};
