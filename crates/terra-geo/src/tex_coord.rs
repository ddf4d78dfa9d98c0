//! Fixed-point surface texture coordinates.
//!
//! `s` spans longitude 0°..360° over `[0, TEX_S_FULL]` and `t` spans latitude
//! −90°..+90° over `[0, TEX_T_FULL]`. Both axes use the same angular unit, so a
//! tile that is square in degrees is also square in texture units. The seam value
//! `TEX_S_FULL` is kept distinct from `0` so that triangles touching the 360°
//! meridian keep monotone coordinates.

use glam::DVec3;

use crate::planet_shape::direction_from_lat_lon;

/// Texture units per full turn of longitude.
pub const TEX_S_FULL: u32 = 1 << 24;

/// Texture units from the south pole to the north pole.
pub const TEX_T_FULL: u32 = 1 << 23;

/// A fixed-point (longitude, latitude) coordinate on the planet surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TexCoord {
    /// Longitude in texture units, `0..=TEX_S_FULL`.
    pub s: u32,
    /// Latitude in texture units, `0` at the south pole.
    pub t: u32,
}

impl TexCoord {
    /// Create a coordinate from raw texture units.
    pub const fn new(s: u32, t: u32) -> Self {
        Self { s, t }
    }

    /// Create a coordinate from degrees. Longitude is expected in `[0, 360]`
    /// and latitude in `[-90, 90]`; out-of-range values are clamped.
    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        let s = (lon.clamp(0.0, 360.0) / 360.0 * TEX_S_FULL as f64).round() as u32;
        let t = ((lat.clamp(-90.0, 90.0) + 90.0) / 180.0 * TEX_T_FULL as f64).round() as u32;
        Self { s, t }
    }

    /// Longitude in radians, `0..=TAU`.
    pub fn longitude(&self) -> f64 {
        self.s as f64 / TEX_S_FULL as f64 * std::f64::consts::TAU
    }

    /// Latitude in radians, `-PI/2..=PI/2`.
    pub fn latitude(&self) -> f64 {
        (self.t as f64 / TEX_T_FULL as f64 - 0.5) * std::f64::consts::PI
    }

    /// True at either pole, where longitude carries no information.
    pub fn is_pole(&self) -> bool {
        self.t == 0 || self.t == TEX_T_FULL
    }

    /// Unit direction from the planet centre through this coordinate.
    pub fn direction(&self) -> DVec3 {
        direction_from_lat_lon(self.latitude(), self.longitude())
    }

    /// Midpoint of the edge `a`–`b` in texture space.
    ///
    /// A pole endpoint contributes no longitude: the midpoint inherits `s` from the
    /// other endpoint. The result is symmetric in its arguments so both triangles
    /// sharing an edge compute the same vertex.
    pub fn midpoint(a: TexCoord, b: TexCoord) -> TexCoord {
        let s = match (a.is_pole(), b.is_pole()) {
            (true, false) => b.s,
            (false, true) => a.s,
            _ => (a.s + b.s) / 2,
        };
        TexCoord { s, t: (a.t + b.t) / 2 }
    }
}
