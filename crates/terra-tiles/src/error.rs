//! Tile cache construction errors.

use terra_geo::{SourceError, TileKey};

/// Errors raised while constructing a [`TileCache`](crate::TileCache).
///
/// Once running, the cache never fails: misses fall back to coarser tiles
/// and worker failures are logged.
#[derive(Debug, thiserror::Error)]
pub enum TileCacheError {
    /// The synthesis worker thread could not be started.
    #[error("failed to spawn tile synthesis worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// A base tile could not be produced.
    #[error("failed to synthesise base tile {key:?}: {source}")]
    BaseTile {
        key: TileKey,
        #[source]
        source: SourceError,
    },

    /// Parameters the cache cannot operate with.
    #[error("invalid tile cache parameters: {0}")]
    InvalidParams(String),
}
