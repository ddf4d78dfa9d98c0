//! Procedural planet surface: multi-octave noise elevation and layered sample blocks.

mod heightmap;
mod procedural;

pub use heightmap::{HeightmapParams, HeightmapSampler};
pub use procedural::{ProceduralSource, SurfaceParams};
