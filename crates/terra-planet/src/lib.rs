//! Adaptive planet renderer core.
//!
//! [`PlanetEngine`] ties the refinement bintree, the surface tile cache and the
//! sector mesh cache to a rendering backend. Each frame:
//!
//! 1. [`PlanetEngine::set_viewpoint`] with the current camera,
//! 2. [`PlanetEngine::render_setup`] to split and merge toward it,
//! 3. [`PlanetEngine::render`] to commit at most one finished tile and emit the
//!    visible triangles.

mod camera;
mod engine;
mod error;
mod render;

pub use camera::PlanetCamera;
pub use engine::{EngineParams, PlanetEngine, RenderStats};
pub use error::EngineError;
pub use render::{HeadlessBackend, RenderBackend, StripVertex};

pub use terra_geo::{PlanetShape, TileDataSource, TileKey};
pub use terra_roam::{FrameStats, Viewpoint};
pub use terra_tiles::{TextureBackend, TextureHandle, TileCacheStats};
