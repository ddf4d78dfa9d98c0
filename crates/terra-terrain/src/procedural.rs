//! A [`TileDataSource`] backed entirely by noise, with colour, cloud and
//! night-light layers derived from elevation and latitude.

use glam::DVec3;
use terra_geo::{RawTile, SourceError, TileDataSource, TileKey, direction_from_lat_lon};

use crate::heightmap::{HeightmapParams, HeightmapSampler};

/// Parameters for the procedural surface layers.
#[derive(Clone, Debug)]
pub struct SurfaceParams {
    /// Elevation ratio of the ocean surface.
    pub sea_level: f64,
    /// Emit a base colour layer. When false, consumers remap heights through a palette.
    pub color: bool,
    /// Emit a cloud opacity layer.
    pub clouds: bool,
    /// Emit a night-light layer.
    pub night_lights: bool,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self {
            sea_level: 0.45,
            color: true,
            clouds: true,
            night_lights: true,
        }
    }
}

/// Procedural planet surface.
pub struct ProceduralSource {
    elevation: HeightmapSampler,
    moisture: HeightmapSampler,
    clouds: HeightmapSampler,
    surface: SurfaceParams,
}

impl ProceduralSource {
    pub fn new(seed: u64, surface: SurfaceParams) -> Self {
        let layer = |offset: u64, base_frequency: f64, octaves: u32| {
            HeightmapSampler::new(HeightmapParams {
                seed: seed.wrapping_add(offset),
                octaves,
                base_frequency,
                ..Default::default()
            })
        };
        Self {
            elevation: layer(0, 1.5, 12),
            moisture: layer(7_919, 2.0, 4),
            clouds: layer(104_729, 3.0, 6),
            surface,
        }
    }

    /// Octaves evaluated for a bintree query at `precision`.
    fn octaves_for(&self, precision: u8) -> u32 {
        (4 + precision as u32 / 2).min(self.elevation.params().octaves)
    }

    fn sample_color(&self, point: DVec3, lat: f64, height: f64) -> [u8; 3] {
        let sea = self.surface.sea_level;
        if height < sea {
            let depth = ((sea - height) / sea.max(1e-6)).clamp(0.0, 1.0);
            return [
                lerp(70.0, 15.0, depth) as u8,
                lerp(130.0, 35.0, depth) as u8,
                lerp(180.0, 90.0, depth) as u8,
            ];
        }

        let h_frac = ((height - sea) / (1.0 - sea).max(1e-6)).clamp(0.0, 1.0);
        let temperature = lat.cos() - h_frac * 0.5;
        let moisture = self.moisture.sample_normalized(point, 4);

        if h_frac > 0.6 || temperature < 0.15 {
            let snow = if temperature < 0.15 {
                1.0
            } else {
                ((h_frac - 0.6) / 0.2).clamp(0.0, 1.0)
            };
            return [
                lerp(160.0, 240.0, snow) as u8,
                lerp(140.0, 240.0, snow) as u8,
                lerp(130.0, 250.0, snow) as u8,
            ];
        }
        if h_frac > 0.35 {
            let rock = ((h_frac - 0.35) / 0.25).clamp(0.0, 1.0);
            return [
                lerp(100.0, 140.0, rock) as u8,
                lerp(90.0, 120.0, rock) as u8,
                lerp(70.0, 100.0, rock) as u8,
            ];
        }
        if moisture > 0.5 && temperature > 0.4 {
            return [40, lerp(120.0, 80.0, h_frac / 0.35) as u8, 30];
        }
        if moisture < 0.35 && temperature > 0.6 {
            return [194, 178, 128];
        }
        [80, lerp(150.0, 110.0, h_frac / 0.35) as u8, 50]
    }
}

impl TileDataSource for ProceduralSource {
    fn displacement(&self, lat: f64, lon: f64, precision: u8) -> f64 {
        let point = direction_from_lat_lon(lat, lon);
        self.elevation
            .sample_normalized(point, self.octaves_for(precision))
    }

    fn tile(&self, key: TileKey, size: u32) -> Result<RawTile, SourceError> {
        if !key.is_valid() || size < 2 {
            return Err(SourceError::OutOfRange(key));
        }

        let bounds = key.bounds();
        let count = (size * size) as usize;
        let octaves = self.elevation.params().octaves;
        let mut heights = Vec::with_capacity(count);
        let mut color = self.surface.color.then(|| Vec::with_capacity(count));
        let mut clouds = self.surface.clouds.then(|| Vec::with_capacity(count));
        let mut night = self.surface.night_lights.then(|| Vec::with_capacity(count));

        let last = (size - 1) as f64;
        for y in 0..size {
            let lat = (bounds.lat_min + (bounds.lat_max - bounds.lat_min) * y as f64 / last)
                .to_radians();
            for x in 0..size {
                let lon = (bounds.lon_min + (bounds.lon_max - bounds.lon_min) * x as f64 / last)
                    .to_radians();
                let point = direction_from_lat_lon(lat, lon);
                let height = self.elevation.sample_normalized(point, octaves);
                heights.push((height * 255.0).round() as u8);

                if let Some(color) = color.as_mut() {
                    color.push(self.sample_color(point, lat, height));
                }
                if let Some(clouds) = clouds.as_mut() {
                    let c = self.clouds.sample_normalized(point, 6);
                    clouds.push((smoothstep(0.5, 0.75, c) * 255.0) as u8);
                }
                if let Some(night) = night.as_mut() {
                    let land = height >= self.surface.sea_level;
                    let m = self.moisture.sample_normalized(point * 8.0, 3);
                    let glow = if land { smoothstep(0.6, 0.8, m) } else { 0.0 };
                    night.push((glow * 255.0) as u8);
                }
            }
        }

        Ok(RawTile {
            key,
            size,
            heights,
            color,
            clouds,
            night,
        })
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
