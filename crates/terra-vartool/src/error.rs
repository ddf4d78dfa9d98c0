//! Errors surfaced by the variance tool.

use terra_config::ConfigError;
use terra_roam::{BinTreeError, VarianceError};

/// Failures surfaced by the variance tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("bintree error: {0}")]
    BinTree(#[from] BinTreeError),

    #[error("variance table error: {0}")]
    Variance(#[from] VarianceError),

    #[error("table level {level} exceeds the supported maximum {max}")]
    LevelTooDeep { level: u8, max: u8 },
}
