//! Shared planet-surface geometry: fixed-point texture coordinates, quadtree tile
//! addressing, planet radii, and the tile data source collaborator trait.

mod planet_shape;
mod source;
mod tex_coord;
mod tile_key;

pub use planet_shape::{PlanetShape, direction_from_lat_lon, lat_lon_from_direction};
pub use source::{RawTile, SourceError, TileDataSource};
pub use tex_coord::{TEX_S_FULL, TEX_T_FULL, TexCoord};
pub use tile_key::{BASE_TILE_LEVEL, MAX_TILE_LEVEL, TileBounds, TileKey};
