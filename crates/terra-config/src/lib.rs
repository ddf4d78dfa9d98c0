//! Configuration for the Terra planet engine.
//!
//! Settings persist to disk as `config.ron`. Every section uses
//! `#[serde(default)]` so older files keep loading as fields are added, and
//! command-line flags parsed with clap override whatever was loaded.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, PlanetConfig, RefinementConfig, SectorConfig, TileConfig,
    VarianceConfig,
};
pub use error::ConfigError;
