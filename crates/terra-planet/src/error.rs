//! Errors raised while assembling the engine.

use terra_config::ConfigError;
use terra_geo::SourceError;
use terra_roam::{BinTreeError, VarianceError};
use terra_tiles::TileCacheError;

/// Errors raised while building a [`PlanetEngine`](crate::PlanetEngine).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("variance table error: {0}")]
    Variance(#[from] VarianceError),

    #[error("bintree error: {0}")]
    BinTree(#[from] BinTreeError),

    #[error("tile cache error: {0}")]
    Tiles(#[from] TileCacheError),

    #[error("tile source error: {0}")]
    Source(#[from] SourceError),
}
