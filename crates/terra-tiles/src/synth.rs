//! Tile synthesis: relief lighting, palette remap, cloud blend and night lights.

use glam::DVec3;
use terra_geo::{RawTile, SourceError, TileDataSource, TileKey, direction_from_lat_lon};

/// Light reaching slopes facing away from the sun.
const AMBIENT: f64 = 0.18;

/// Resolution of the daylight table over sun height `[-1, 1]`.
const DAYLIGHT_STEPS: usize = 256;

/// Inputs to [`synthesize`] that do not change between tiles.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisParams {
    /// Texels per tile edge.
    pub tile_size: u32,
    /// Sun movement at the equator, in degrees, before a tile is stale.
    pub stale_sun_degrees: f64,
    /// Radius of elevation ratio 0, in metres.
    pub min_radius: f64,
    /// Metres between elevation ratio 0 and 1.
    pub relief: f64,
    /// Elevation ratio of the ocean surface.
    pub sea_level: f64,
}

/// A finished tile waiting to be committed to the backend.
#[derive(Clone, Debug)]
pub struct SynthesizedTile {
    pub key: TileKey,
    pub size: u32,
    /// `size * size` RGBA8 texels, row 0 at the southern edge.
    pub rgba: Vec<u8>,
    /// Sun longitude, in degrees, the tile was shaded for.
    pub sun_longitude: f64,
    pub stale_threshold: f64,
}

/// Lookup tables computed once per cache.
pub struct ShadingTables {
    palette: [[u8; 3]; 256],
    daylight: [f32; DAYLIGHT_STEPS],
    sea_byte: u8,
}

impl ShadingTables {
    pub fn new(sea_level: f64) -> Self {
        let sea = sea_level.clamp(0.0, 1.0);
        let sea_byte = (sea * 255.0).round() as u8;

        let mut palette = [[0u8; 3]; 256];
        for (i, color) in palette.iter_mut().enumerate() {
            let h = i as f64 / 255.0;
            *color = if h < sea {
                let depth = ((sea - h) / sea.max(1e-6)).clamp(0.0, 1.0);
                mix([60.0, 120.0, 170.0], [10.0, 30.0, 80.0], depth)
            } else {
                let t = ((h - sea) / (1.0 - sea).max(1e-6)).clamp(0.0, 1.0);
                if t < 0.45 {
                    mix([90.0, 140.0, 60.0], [150.0, 140.0, 90.0], t / 0.45)
                } else if t < 0.8 {
                    mix([150.0, 140.0, 90.0], [120.0, 100.0, 85.0], (t - 0.45) / 0.35)
                } else {
                    mix([120.0, 100.0, 85.0], [245.0, 245.0, 250.0], (t - 0.8) / 0.2)
                }
            };
        }

        // Twilight band from the sun 6° below the horizon to 9° above.
        let mut daylight = [0.0f32; DAYLIGHT_STEPS];
        for (i, value) in daylight.iter_mut().enumerate() {
            let sun_height = i as f64 / (DAYLIGHT_STEPS - 1) as f64 * 2.0 - 1.0;
            *value = smoothstep(-0.1, 0.15, sun_height) as f32;
        }

        Self {
            palette,
            daylight,
            sea_byte,
        }
    }

    /// Palette colour for a quantised elevation.
    pub fn palette(&self, height: u8) -> [u8; 3] {
        self.palette[height as usize]
    }

    /// Fraction of daylight for the sine of the sun's elevation.
    pub fn daylight(&self, sun_height: f64) -> f64 {
        let i = ((sun_height.clamp(-1.0, 1.0) + 1.0) * 0.5 * (DAYLIGHT_STEPS - 1) as f64).round();
        self.daylight[i as usize] as f64
    }
}

/// Sun movement after which a tile at `key` is stale.
///
/// Longitude degrees shrink towards the poles, so the threshold grows with
/// latitude, capped at four times the equatorial value.
pub fn stale_threshold(key: TileKey, stale_sun_degrees: f64) -> f64 {
    let (lat, _) = key.bounds().center();
    stale_sun_degrees / lat.abs().to_radians().cos().max(0.25)
}

/// Whether the sun has moved more than `threshold` degrees since `generated_at`.
pub fn is_stale(generated_at: f64, threshold: f64, sun_longitude: f64) -> bool {
    let diff = (sun_longitude - generated_at).rem_euclid(360.0);
    diff.min(360.0 - diff) > threshold
}

/// Fetch raw samples for `key` and shade them for a sun over `sun_longitude` degrees.
pub fn synthesize(
    source: &dyn TileDataSource,
    key: TileKey,
    params: &SynthesisParams,
    sun_longitude: f64,
    tables: &ShadingTables,
) -> Result<SynthesizedTile, SourceError> {
    let raw = source.tile(key, params.tile_size)?;
    raw.validate()?;
    if raw.size != params.tile_size || raw.size < 2 {
        return Err(SourceError::Malformed {
            key,
            expected: (params.tile_size * params.tile_size) as usize,
            actual: raw.heights.len(),
        });
    }

    let size = raw.size as usize;
    let bounds = key.bounds();
    let step_deg = (bounds.lat_max - bounds.lat_min) / (size - 1) as f64;
    let step_north_m = params.min_radius * step_deg.to_radians();
    let metres_per_unit = params.relief / 255.0;

    let sun_lon = sun_longitude.to_radians();
    let sun = DVec3::new(sun_lon.cos(), sun_lon.sin(), 0.0);

    let mut rgba = Vec::with_capacity(size * size * 4);
    for row in 0..size {
        let lat = (bounds.lat_min + row as f64 * step_deg).to_radians();
        let step_east_m = step_north_m * lat.cos().max(1e-3);
        for col in 0..size {
            let lon = (bounds.lon_min + col as f64 * step_deg).to_radians();
            let up = direction_from_lat_lon(lat, lon);
            let east = DVec3::new(-lon.sin(), lon.cos(), 0.0);
            let north = up.cross(east);

            let (dx, dy) = slope(&raw, tables.sea_byte, col, row);
            let normal = (up
                - east * (dx * metres_per_unit / step_east_m)
                - north * (dy * metres_per_unit / step_north_m))
                .try_normalize()
                .unwrap_or(up);

            let i = row * size + col;
            let daylight = tables.daylight(up.dot(sun));
            let diffuse = normal.dot(sun).max(0.0);
            let light = AMBIENT + (1.0 - AMBIENT) * diffuse;

            let base = match &raw.color {
                Some(color) => color[i],
                None => tables.palette(raw.heights[i]),
            };
            let mut texel = base.map(|c| c as f64 * light * daylight);

            if let Some(clouds) = &raw.clouds {
                let opacity = clouds[i] as f64 / 255.0;
                let cloud = 255.0 * (AMBIENT + (1.0 - AMBIENT) * up.dot(sun).max(0.0)) * daylight;
                texel = texel.map(|c| c + (cloud - c) * opacity);
            }

            if let Some(night) = &raw.night {
                let glow = night[i] as f64 * (1.0 - daylight);
                let cover = raw.clouds.as_ref().map_or(0.0, |c| c[i] as f64 / 255.0);
                let glow = glow * (1.0 - 0.7 * cover);
                texel[0] += glow;
                texel[1] += glow * 0.85;
                texel[2] += glow * 0.55;
            }

            let [r, g, b] = texel.map(|c| c.round().clamp(0.0, 255.0) as u8);
            rgba.extend_from_slice(&[r, g, b, 255]);
        }
    }

    Ok(SynthesizedTile {
        key,
        size: raw.size,
        rgba,
        sun_longitude,
        stale_threshold: stale_threshold(key, params.stale_sun_degrees),
    })
}

/// Height change per sample east and north, with the ocean held flat at sea level.
fn slope(raw: &RawTile, sea: u8, col: usize, row: usize) -> (f64, f64) {
    let max = raw.size as usize - 1;
    let height = |x: usize, y: usize| raw.height(x as i64, y as i64).max(sea) as f64;
    let (x0, x1) = (col.saturating_sub(1), (col + 1).min(max));
    let (y0, y1) = (row.saturating_sub(1), (row + 1).min(max));
    let dx = (height(x1, row) - height(x0, row)) / (x1 - x0) as f64;
    let dy = (height(col, y1) - height(col, y0)) / (y1 - y0) as f64;
    (dx, dy)
}

fn mix(a: [f64; 3], b: [f64; 3], t: f64) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    [0, 1, 2].map(|i| (a[i] + (b[i] - a[i]) * t).round() as u8)
}

fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatSource {
        height: u8,
        night: u8,
        clouds: Option<u8>,
    }

    impl TileDataSource for FlatSource {
        fn displacement(&self, _lat: f64, _lon: f64, _precision: u8) -> f64 {
            self.height as f64 / 255.0
        }

        fn tile(&self, key: TileKey, size: u32) -> Result<RawTile, SourceError> {
            let mut tile = RawTile::flat(key, size, self.height);
            let n = (size * size) as usize;
            tile.color = Some(vec![[200, 200, 200]; n]);
            tile.night = Some(vec![self.night; n]);
            tile.clouds = self.clouds.map(|c| vec![c; n]);
            Ok(tile)
        }
    }

    struct ShortSource;

    impl TileDataSource for ShortSource {
        fn displacement(&self, _lat: f64, _lon: f64, _precision: u8) -> f64 {
            0.0
        }

        fn tile(&self, key: TileKey, _size: u32) -> Result<RawTile, SourceError> {
            Ok(RawTile::flat(key, 4, 0))
        }
    }

    fn params() -> SynthesisParams {
        SynthesisParams {
            tile_size: 8,
            stale_sun_degrees: 10.0,
            min_radius: 1000.0,
            relief: 100.0,
            sea_level: 0.4,
        }
    }

    fn texel(tile: &SynthesizedTile, col: usize, row: usize) -> [u8; 4] {
        let i = (row * tile.size as usize + col) * 4;
        [tile.rgba[i], tile.rgba[i + 1], tile.rgba[i + 2], tile.rgba[i + 3]]
    }

    #[test]
    fn test_day_side_brighter_than_night_side() {
        let source = FlatSource {
            height: 200,
            night: 0,
            clouds: None,
        };
        let tables = ShadingTables::new(0.4);
        // Equatorial tile around longitude 0°..1.4°.
        let key = TileKey::new(0, 64, 14);
        let day = synthesize(&source, key, &params(), 0.0, &tables).unwrap();
        let night = synthesize(&source, key, &params(), 180.0, &tables).unwrap();

        assert_eq!(day.rgba.len(), 8 * 8 * 4);
        assert!(texel(&day, 4, 4)[0] > 150);
        assert_eq!(texel(&night, 4, 4), [0, 0, 0, 255]);
    }

    #[test]
    fn test_night_lights_on_dark_side_only() {
        let source = FlatSource {
            height: 200,
            night: 120,
            clouds: None,
        };
        let tables = ShadingTables::new(0.4);
        let key = TileKey::new(0, 64, 14);
        let night = synthesize(&source, key, &params(), 180.0, &tables).unwrap();
        let lit = texel(&night, 3, 3);
        assert!(lit[0] > 100 && lit[0] > lit[2]);
    }

    #[test]
    fn test_clouds_whiten_day_side() {
        let tables = ShadingTables::new(0.4);
        let key = TileKey::new(0, 64, 14);
        let clear = FlatSource {
            height: 100,
            night: 0,
            clouds: None,
        };
        let overcast = FlatSource {
            clouds: Some(255),
            ..clear
        };
        let clear = synthesize(&clear, key, &params(), 0.0, &tables).unwrap();
        let overcast = synthesize(&overcast, key, &params(), 0.0, &tables).unwrap();
        assert!(texel(&overcast, 2, 2)[2] > texel(&clear, 2, 2)[2]);
    }

    #[test]
    fn test_wrong_size_block_rejected() {
        let tables = ShadingTables::new(0.4);
        let err = synthesize(&ShortSource, TileKey::new(0, 0, 8), &params(), 0.0, &tables);
        assert!(matches!(err, Err(SourceError::Malformed { .. })));
    }

    #[test]
    fn test_palette_separates_sea_and_land() {
        let tables = ShadingTables::new(0.5);
        let deep = tables.palette(0);
        let shore = tables.palette(140);
        let peak = tables.palette(255);
        assert!(deep[2] > deep[0]);
        assert!(shore[1] > shore[2]);
        assert!(peak.iter().all(|&c| c > 230));
    }

    #[test]
    fn test_stale_threshold_grows_with_latitude() {
        let equator = stale_threshold(TileKey::new(0, 64, 14), 10.0);
        let polar = stale_threshold(TileKey::new(0, 127, 14), 10.0);
        assert!((equator - 10.0).abs() < 0.01);
        assert!((polar - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_is_stale_wraps_longitude() {
        assert!(!is_stale(355.0, 10.0, 3.0));
        assert!(is_stale(355.0, 10.0, 10.0));
        assert!(!is_stale(0.0, 10.0, -9.0));
        assert!(is_stale(90.0, 10.0, 270.0));
    }
}
