//! Configuration structs with engine defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_NAME: &str = "terra";

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub planet: PlanetConfig,
    pub refinement: RefinementConfig,
    pub tiles: TileConfig,
    pub sectors: SectorConfig,
    pub variance: VarianceConfig,
    pub debug: DebugConfig,
}

/// Planet shape and procedural surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlanetConfig {
    /// Radius of the lowest possible surface, in metres.
    pub min_radius_m: f64,
    /// Radius of the highest possible surface, in metres.
    pub max_radius_m: f64,
    /// Seed for the procedural surface.
    pub seed: u64,
    /// Elevation ratio of the ocean surface.
    pub sea_level: f64,
    /// Generate a base colour layer. When off, heights map through a palette.
    pub color: bool,
    pub clouds: bool,
    pub night_lights: bool,
}

/// Bintree refinement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefinementConfig {
    /// Acceptable projected error per triangle, in pixels.
    pub pixels_per_triangle: f64,
    /// Deepest bintree level.
    pub max_level: u8,
    /// Splits stop once this many nodes are live.
    pub triangle_budget: usize,
    /// Fixed size of the node pool.
    pub node_pool_capacity: usize,
    pub viewport_height: u32,
    pub fov_y_degrees: f64,
    /// Favour detail under the centre of the view.
    pub view_center_boost: bool,
}

/// Surface texture cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TileConfig {
    /// Texels per tile edge.
    pub tile_size: u32,
    /// Texture slots, including the two reserved for base tiles.
    pub slot_capacity: usize,
    /// Pending synthesis requests kept; the finest are dropped past this.
    pub queue_capacity: usize,
    /// Finest tile level ever requested.
    pub max_level: u8,
    /// Sun movement, in degrees of longitude at the equator, before a tile is resynthesised.
    pub stale_sun_degrees: f64,
    /// Sun longitude at startup, in degrees.
    pub sun_longitude_degrees: f64,
}

/// Sector mesh cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SectorConfig {
    /// Patches kept before the least recently used is evicted.
    pub capacity: usize,
}

/// Precomputed variance table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VarianceConfig {
    /// Table file; live elevation queries are used when unset.
    pub table_path: Option<PathBuf>,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Check bintree invariants every frame in release builds too.
    pub validate_every_frame: bool,
}

// --- Default implementations ---

impl Default for PlanetConfig {
    fn default() -> Self {
        Self {
            min_radius_m: 6_371_000.0,
            max_radius_m: 6_391_000.0,
            seed: 42,
            sea_level: 0.45,
            color: true,
            clouds: true,
            night_lights: true,
        }
    }
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            pixels_per_triangle: 4.0,
            max_level: 30,
            triangle_budget: 20_000,
            node_pool_capacity: 1 << 16,
            viewport_height: 768,
            fov_y_degrees: 60.0,
            view_center_boost: true,
        }
    }
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            slot_capacity: 64,
            queue_capacity: 2,
            max_level: 18,
            stale_sun_degrees: 10.0,
            sun_longitude_degrees: 0.0,
        }
    }
}

impl Default for SectorConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            validate_every_frame: false,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for the engine, e.g. `~/.config/terra`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_NAME))
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let p = &self.planet;
        if !(p.min_radius_m > 0.0) || p.max_radius_m < p.min_radius_m {
            return invalid(format!(
                "planet radii must satisfy 0 < min <= max, got {} and {}",
                p.min_radius_m, p.max_radius_m
            ));
        }
        if self.refinement.node_pool_capacity < 8 {
            return invalid("node_pool_capacity must hold the 8 root triangles".to_string());
        }
        if self.refinement.viewport_height == 0 {
            return invalid("viewport_height must be positive".to_string());
        }
        if self.tiles.queue_capacity == 0 {
            return invalid("tile queue_capacity must be at least 1".to_string());
        }
        if self.tiles.slot_capacity < 3 {
            return invalid(format!(
                "tile slot_capacity {} leaves no slot beside the two base tiles",
                self.tiles.slot_capacity
            ));
        }
        if self.tiles.tile_size < 2 {
            return invalid("tile_size must be at least 2".to_string());
        }
        Ok(())
    }
}
