//! Multi-octave fractal Brownian motion (fBm) sampled on the unit sphere.
//!
//! Sampling in 3D sphere-surface coordinates keeps the field continuous across
//! the longitude seam and over the poles, which the bintree relies on when the
//! two triangles of a diamond query the same edge midpoint.

use glam::DVec3;
use noise::{NoiseFn, Simplex};

/// Configuration for multi-octave fBm noise.
#[derive(Clone, Debug)]
pub struct HeightmapParams {
    /// Seed for deterministic generation.
    pub seed: u64,
    /// Maximum number of octaves composited.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves. Default: 2.0.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves. Default: 0.5.
    pub persistence: f64,
    /// Frequency of the first octave, in cycles per unit sphere radius.
    pub base_frequency: f64,
}

impl Default for HeightmapParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 10,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 1.5,
        }
    }
}

/// Generates normalised elevation values using fBm over simplex noise.
pub struct HeightmapSampler {
    noise: Simplex,
    params: HeightmapParams,
}

impl HeightmapSampler {
    pub fn new(params: HeightmapParams) -> Self {
        let noise = Simplex::new(params.seed as u32);
        Self { noise, params }
    }

    /// Raw fBm value at a unit-sphere point using at most `octaves` octaves.
    ///
    /// The range is `[-max_amplitude(octaves), +max_amplitude(octaves)]`.
    pub fn sample_3d(&self, point: DVec3, octaves: u32) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = 1.0;

        for _ in 0..octaves.min(self.params.octaves) {
            let p = point * frequency;
            total += self.noise.get([p.x, p.y, p.z]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }

        total
    }

    /// fBm remapped to `[0, 1]`.
    pub fn sample_normalized(&self, point: DVec3, octaves: u32) -> f64 {
        let max_amp = self.max_amplitude(octaves);
        if max_amp == 0.0 {
            return 0.5;
        }
        ((self.sample_3d(point, octaves) / max_amp + 1.0) * 0.5).clamp(0.0, 1.0)
    }

    /// Geometric sum of the first `octaves` amplitudes.
    pub fn max_amplitude(&self, octaves: u32) -> f64 {
        let mut sum = 0.0;
        let mut amp = 1.0;
        for _ in 0..octaves.min(self.params.octaves) {
            sum += amp;
            amp *= self.params.persistence;
        }
        sum
    }

    pub fn params(&self) -> &HeightmapParams {
        &self.params
    }
}
