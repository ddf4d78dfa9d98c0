//! Command-line overrides shared by the Terra binaries.

use std::path::PathBuf;

use clap::Args;

use crate::Config;

/// Flags that override values loaded from `config.ron`.
#[derive(Args, Debug, Default, Clone)]
pub struct CliArgs {
    /// Planet seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Acceptable projected error per triangle, in pixels.
    #[arg(long)]
    pub pixels_per_triangle: Option<f64>,

    /// Live node budget for refinement.
    #[arg(long)]
    pub triangle_budget: Option<usize>,

    /// Texels per tile edge.
    #[arg(long)]
    pub tile_size: Option<u32>,

    /// Variance table file.
    #[arg(long)]
    pub variance_table: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(seed) = args.seed {
            self.planet.seed = seed;
        }
        if let Some(ppt) = args.pixels_per_triangle {
            self.refinement.pixels_per_triangle = ppt;
        }
        if let Some(budget) = args.triangle_budget {
            self.refinement.triangle_budget = budget;
        }
        if let Some(size) = args.tile_size {
            self.tiles.tile_size = size;
        }
        if let Some(ref path) = args.variance_table {
            self.variance.table_path = Some(path.clone());
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
