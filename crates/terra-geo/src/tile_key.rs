//! Quadtree tile addressing over the equirectangular surface parameterisation.

use crate::tex_coord::{TEX_S_FULL, TexCoord};

/// Coarsest tile level. Level 7 is split into two 180°×180° tiles.
pub const BASE_TILE_LEVEL: u8 = 7;

/// Finest addressable tile level.
pub const MAX_TILE_LEVEL: u8 = 24;

/// Identifies a square surface region at a quadtree level.
///
/// At level `L` the grid has `2 · 2^(L − 7)` columns of longitude and
/// `2^(L − 7)` rows of latitude, row 0 touching the south pole.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Column index (longitude).
    pub x: u32,
    /// Row index (latitude).
    pub y: u32,
    /// Quadtree level, `>= BASE_TILE_LEVEL`.
    pub level: u8,
}

/// Angular extent of a tile, in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileBounds {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl TileBounds {
    /// Centre of the tile as `(lat, lon)` in degrees.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.lat_min + self.lat_max) * 0.5,
            (self.lon_min + self.lon_max) * 0.5,
        )
    }
}

impl TileKey {
    pub const fn new(x: u32, y: u32, level: u8) -> Self {
        Self { x, y, level }
    }

    /// The two tiles of the base level. These always have a resident texture.
    pub const fn base_tiles() -> [TileKey; 2] {
        [
            TileKey::new(0, 0, BASE_TILE_LEVEL),
            TileKey::new(1, 0, BASE_TILE_LEVEL),
        ]
    }

    /// Number of tile columns at `level`.
    pub fn columns(level: u8) -> u32 {
        debug_assert!((BASE_TILE_LEVEL..=MAX_TILE_LEVEL).contains(&level));
        2 << (level - BASE_TILE_LEVEL)
    }

    /// Number of tile rows at `level`.
    pub fn rows(level: u8) -> u32 {
        debug_assert!((BASE_TILE_LEVEL..=MAX_TILE_LEVEL).contains(&level));
        1 << (level - BASE_TILE_LEVEL)
    }

    /// Edge length of a tile at `level`, in texture units (same on both axes).
    pub fn span(level: u8) -> u32 {
        TEX_S_FULL / Self::columns(level)
    }

    /// Whether the key addresses an existing tile.
    pub fn is_valid(&self) -> bool {
        (BASE_TILE_LEVEL..=MAX_TILE_LEVEL).contains(&self.level)
            && self.x < Self::columns(self.level)
            && self.y < Self::rows(self.level)
    }

    /// Base-level tiles hold reserved texture slots and are never evicted.
    pub fn is_base(&self) -> bool {
        self.level <= BASE_TILE_LEVEL
    }

    /// The enclosing tile one level coarser, or `None` at the base level.
    pub fn parent(&self) -> Option<TileKey> {
        if self.is_base() {
            return None;
        }
        Some(TileKey::new(self.x / 2, self.y / 2, self.level - 1))
    }

    /// Texture-space origin (south-west corner) of the tile.
    pub fn tex_origin(&self) -> TexCoord {
        let span = Self::span(self.level);
        TexCoord::new(self.x * span, self.y * span)
    }

    /// Position of `tc` within this tile, `[0, 1]` on both axes when inside.
    pub fn local_uv(&self, tc: TexCoord) -> [f32; 2] {
        let span = Self::span(self.level) as f64;
        let origin = self.tex_origin();
        [
            ((tc.s as f64 - origin.s as f64) / span) as f32,
            ((tc.t as f64 - origin.t as f64) / span) as f32,
        ]
    }

    /// Angular bounds of the tile in degrees.
    pub fn bounds(&self) -> TileBounds {
        let span = Self::span(self.level) as f64;
        let origin = self.tex_origin();
        let deg_per_unit = 360.0 / TEX_S_FULL as f64;
        let lon_min = origin.s as f64 * deg_per_unit;
        let lat_min = origin.t as f64 * deg_per_unit - 90.0;
        TileBounds {
            lon_min,
            lon_max: lon_min + span * deg_per_unit,
            lat_min,
            lat_max: lat_min + span * deg_per_unit,
        }
    }

    /// The tile at `level` that contains every coordinate in `coords`, if one does.
    ///
    /// Tile edges are inclusive, so a triangle whose vertex lies exactly on a tile
    /// border still fits.
    pub fn containing(coords: &[TexCoord], level: u8) -> Option<TileKey> {
        let first = coords.first()?;
        let (mut s_min, mut s_max, mut t_min, mut t_max) = (first.s, first.s, first.t, first.t);
        for tc in &coords[1..] {
            s_min = s_min.min(tc.s);
            s_max = s_max.max(tc.s);
            t_min = t_min.min(tc.t);
            t_max = t_max.max(tc.t);
        }

        let span = Self::span(level);
        let x = (s_min / span).min(Self::columns(level) - 1);
        let y = (t_min / span).min(Self::rows(level) - 1);
        let fits_s = s_max <= (x + 1) * span;
        let fits_t = t_max <= (y + 1) * span;
        (fits_s && fits_t).then_some(TileKey::new(x, y, level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tex_coord::TEX_T_FULL;

    #[test]
    fn test_base_level_grid() {
        assert_eq!(TileKey::columns(BASE_TILE_LEVEL), 2);
        assert_eq!(TileKey::rows(BASE_TILE_LEVEL), 1);
        assert_eq!(TileKey::span(BASE_TILE_LEVEL), TEX_T_FULL);
        for key in TileKey::base_tiles() {
            assert!(key.is_valid());
            assert!(key.is_base());
            assert_eq!(key.parent(), None);
        }
    }

    #[test]
    fn test_parent_halves_coordinates() {
        let key = TileKey::new(13, 6, 10);
        assert_eq!(key.parent(), Some(TileKey::new(6, 3, 9)));
    }

    #[test]
    fn test_bounds_of_base_tile() {
        let b = TileKey::new(1, 0, BASE_TILE_LEVEL).bounds();
        assert!((b.lon_min - 180.0).abs() < 1e-9);
        assert!((b.lon_max - 360.0).abs() < 1e-9);
        assert!((b.lat_min + 90.0).abs() < 1e-9);
        assert!((b.lat_max - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_containing_octant_fits_base_tile() {
        let coords = [
            TexCoord::from_degrees(90.0, 135.0),
            TexCoord::from_degrees(0.0, 90.0),
            TexCoord::from_degrees(0.0, 180.0),
        ];
        assert_eq!(
            TileKey::containing(&coords, BASE_TILE_LEVEL),
            Some(TileKey::new(0, 0, BASE_TILE_LEVEL))
        );
        // Spans 90° of longitude: too wide for a level-9 tile (45°).
        assert_eq!(TileKey::containing(&coords, 9), None);
    }

    #[test]
    fn test_local_uv_corners() {
        let key = TileKey::new(3, 1, 9);
        assert_eq!(key.local_uv(key.tex_origin()), [0.0, 0.0]);
        let span = TileKey::span(9);
        let far = TexCoord::new(key.tex_origin().s + span, key.tex_origin().t + span);
        assert_eq!(key.local_uv(far), [1.0, 1.0]);
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(!TileKey::new(2, 0, BASE_TILE_LEVEL).is_valid());
        assert!(!TileKey::new(0, 0, 3).is_valid());
    }
}
