//! Sector mesh geometry.

use glam::DVec3;
use terra_geo::{
    PlanetShape, RawTile, SourceError, TileDataSource, TileKey, direction_from_lat_lon,
};

/// Vertices per grid edge.
pub const GRID_SIZE: usize = 18;

/// Heightfield samples per tile edge read for a sector.
pub const SAMPLE_SIZE: u32 = 256;

/// Samples between neighbouring grid vertices. `17 * 15` spans the whole tile.
pub const SAMPLE_STRIDE: usize = 15;

/// Indices per triangle strip row.
pub const STRIP_LEN: usize = GRID_SIZE * 2;

/// A sector vertex, 20 bytes.
///
/// `position` is relative to the sector origin so it keeps full `f32`
/// precision at planetary radii.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SectorVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

static_assertions::assert_eq_size!(SectorVertex, [u8; 20]);

/// A regular-grid patch covering one tile.
#[derive(Clone, Debug)]
pub struct SectorMesh {
    pub key: TileKey,
    /// Centre of the tile on the min-radius sphere; vertex positions are relative to it.
    pub origin: DVec3,
    /// `GRID_SIZE * GRID_SIZE` vertices, row-major from the southern edge.
    pub vertices: Vec<SectorVertex>,
    /// `GRID_SIZE - 1` strips of [`STRIP_LEN`] indices.
    pub strips: Vec<[u16; STRIP_LEN]>,
    /// Tile whose texture the UVs address.
    pub texture_key: TileKey,
}

impl SectorMesh {
    /// Sample `key`'s heightfield and build its grid.
    pub fn build(
        source: &dyn TileDataSource,
        shape: &PlanetShape,
        key: TileKey,
    ) -> Result<Self, SourceError> {
        if !key.is_valid() {
            return Err(SourceError::OutOfRange(key));
        }
        let raw = source.tile(key, SAMPLE_SIZE)?;
        raw.validate()?;
        if raw.size != SAMPLE_SIZE {
            return Err(SourceError::Malformed {
                key,
                expected: (SAMPLE_SIZE * SAMPLE_SIZE) as usize,
                actual: raw.heights.len(),
            });
        }
        Ok(Self::from_raw(shape, &raw))
    }

    fn from_raw(shape: &PlanetShape, raw: &RawTile) -> Self {
        let key = raw.key;
        let bounds = key.bounds();
        let (lat_c, lon_c) = bounds.center();
        let origin =
            direction_from_lat_lon(lat_c.to_radians(), lon_c.to_radians()) * shape.min_radius;

        let last = (GRID_SIZE - 1) as f64;
        let mut vertices = Vec::with_capacity(GRID_SIZE * GRID_SIZE);
        for row in 0..GRID_SIZE {
            let v = row as f64 / last;
            let lat = bounds.lat_min + (bounds.lat_max - bounds.lat_min) * v;
            for col in 0..GRID_SIZE {
                let u = col as f64 / last;
                let lon = bounds.lon_min + (bounds.lon_max - bounds.lon_min) * u;
                let height =
                    raw.height((col * SAMPLE_STRIDE) as i64, (row * SAMPLE_STRIDE) as i64);
                let radius = shape.radius_at(height as f64 / 255.0);
                let point = direction_from_lat_lon(lat.to_radians(), lon.to_radians()) * radius;
                vertices.push(SectorVertex {
                    position: (point - origin).as_vec3().to_array(),
                    uv: [u as f32, v as f32],
                });
            }
        }

        Self {
            key,
            origin,
            vertices,
            strips: strip_indices(),
            texture_key: key,
        }
    }

    /// Remap UVs into `texture_key`'s extent.
    ///
    /// `texture_key` is normally an ancestor of the sector's own tile.
    pub fn rebind_texture(&mut self, texture_key: TileKey) {
        let span = TileKey::span(self.key.level) as f64;
        let origin = self.key.tex_origin();
        let target_span = TileKey::span(texture_key.level) as f64;
        let target = texture_key.tex_origin();
        let offset_s = (origin.s as f64 - target.s as f64) / target_span;
        let offset_t = (origin.t as f64 - target.t as f64) / target_span;
        let scale = span / target_span;

        let last = (GRID_SIZE - 1) as f64;
        for (i, vertex) in self.vertices.iter_mut().enumerate() {
            let (row, col) = (i / GRID_SIZE, i % GRID_SIZE);
            vertex.uv = [
                (offset_s + col as f64 / last * scale) as f32,
                (offset_t + row as f64 / last * scale) as f32,
            ];
        }
        self.texture_key = texture_key;
    }

    /// Vertex bytes for upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

fn strip_indices() -> Vec<[u16; STRIP_LEN]> {
    (0..GRID_SIZE - 1)
        .map(|row| {
            let mut strip = [0u16; STRIP_LEN];
            for col in 0..GRID_SIZE {
                strip[col * 2] = ((row + 1) * GRID_SIZE + col) as u16;
                strip[col * 2 + 1] = (row * GRID_SIZE + col) as u16;
            }
            strip
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RampSource;

    impl TileDataSource for RampSource {
        fn displacement(&self, _lat: f64, _lon: f64, _precision: u8) -> f64 {
            0.0
        }

        fn tile(&self, key: TileKey, size: u32) -> Result<RawTile, SourceError> {
            let mut tile = RawTile::flat(key, size, 0);
            for (i, h) in tile.heights.iter_mut().enumerate() {
                *h = (i % size as usize) as u8;
            }
            Ok(tile)
        }
    }

    fn shape() -> PlanetShape {
        PlanetShape::new(1000.0, 1255.0)
    }

    #[test]
    fn test_grid_dimensions() {
        let mesh = SectorMesh::build(&RampSource, &shape(), TileKey::new(5, 3, 10)).unwrap();
        assert_eq!(mesh.vertices.len(), 18 * 18);
        assert_eq!(mesh.strips.len(), 17);
        assert_eq!(mesh.vertex_bytes().len(), 18 * 18 * 20);
        let max = mesh.strips.iter().flatten().copied().max();
        assert_eq!(max, Some(18 * 18 - 1));
    }

    #[test]
    fn test_heights_follow_stride() {
        let shape = shape();
        let mesh = SectorMesh::build(&RampSource, &shape, TileKey::new(5, 3, 10)).unwrap();
        // The ramp rises one unit per column, so column c sits at c * 15 / 255 relief.
        for col in [0, 1, 17] {
            let vertex = mesh.vertices[4 * GRID_SIZE + col];
            let radius = (mesh.origin + glam::Vec3::from(vertex.position).as_dvec3()).length();
            let expected = shape.radius_at((col * SAMPLE_STRIDE) as f64 / 255.0);
            assert!((radius - expected).abs() < 1e-3, "{radius} vs {expected}");
        }
    }

    #[test]
    fn test_strips_wind_counter_clockwise_from_outside() {
        let mesh = SectorMesh::build(&RampSource, &shape(), TileKey::new(5, 3, 10)).unwrap();
        let strip = mesh.strips[0];
        let p = |i: u16| {
            glam::Vec3::from(mesh.vertices[i as usize].position).as_dvec3() + mesh.origin
        };
        let (a, b, c) = (p(strip[0]), p(strip[1]), p(strip[2]));
        let normal = (b - a).cross(c - a);
        assert!(normal.dot(mesh.origin) > 0.0);
    }

    #[test]
    fn test_rebind_to_parent_uses_quadrant() {
        let key = TileKey::new(5, 3, 10);
        let mut mesh = SectorMesh::build(&RampSource, &shape(), key).unwrap();
        let parent = key.parent().unwrap();
        mesh.rebind_texture(parent);
        assert_eq!(mesh.texture_key, parent);
        let first = mesh.vertices[0].uv;
        let last = mesh.vertices[GRID_SIZE * GRID_SIZE - 1].uv;
        // x = 5 and y = 3 are both odd: the upper-right quadrant of the parent.
        assert!((first[0] - 0.5).abs() < 1e-6 && (first[1] - 0.5).abs() < 1e-6);
        assert!((last[0] - 1.0).abs() < 1e-6 && (last[1] - 1.0).abs() < 1e-6);

        mesh.rebind_texture(key);
        let uv = mesh.vertices[GRID_SIZE + 1].uv;
        assert!(uv.iter().all(|c| (c - 1.0 / 17.0).abs() < 1e-6));
    }

    #[test]
    fn test_invalid_key_rejected() {
        let err = SectorMesh::build(&RampSource, &shape(), TileKey::new(9, 0, 7));
        assert!(matches!(err, Err(SourceError::OutOfRange(_))));
    }
}
