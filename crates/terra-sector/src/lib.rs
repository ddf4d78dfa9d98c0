//! Fixed-detail sector meshes: regular grid patches built from a tile's
//! heightfield and memoised in a bounded least-recently-used cache.

mod cache;
mod mesh;

pub use cache::SectorMeshCache;
pub use mesh::{GRID_SIZE, SAMPLE_SIZE, SAMPLE_STRIDE, STRIP_LEN, SectorMesh, SectorVertex};
