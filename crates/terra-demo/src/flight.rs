//! A scripted descent towards the surface.

use terra_geo::{TexCoord, TileKey};
use terra_planet::PlanetCamera;

/// Camera path from orbit down to low altitude along a great-ish arc.
///
/// Altitude falls geometrically so each frame covers a similar share of the
/// remaining distance; latitude and longitude move linearly.
#[derive(Clone, Debug)]
pub struct FlightPath {
    pub radius: f64,
    pub start_altitude: f64,
    pub end_altitude: f64,
    /// Degrees.
    pub start: (f64, f64),
    /// Degrees.
    pub end: (f64, f64),
    pub frames: u32,
    /// Radians from nadir at the end of the descent.
    pub end_tilt: f64,
    pub fov_y: f64,
    pub aspect_ratio: f64,
}

impl FlightPath {
    pub fn descent(radius: f64, frames: u32) -> Self {
        Self {
            radius,
            start_altitude: radius * 2.0,
            end_altitude: (radius * 1e-4).max(10.0),
            start: (10.0, 20.0),
            end: (35.0, 60.0),
            frames: frames.max(2),
            end_tilt: 1.2,
            fov_y: 60f64.to_radians(),
            aspect_ratio: 16.0 / 9.0,
        }
    }

    fn progress(&self, frame: u32) -> f64 {
        frame.min(self.frames - 1) as f64 / (self.frames - 1) as f64
    }

    pub fn altitude(&self, frame: u32) -> f64 {
        let t = self.progress(frame);
        self.start_altitude * (self.end_altitude / self.start_altitude).powf(t)
    }

    /// Latitude and longitude in degrees.
    pub fn ground(&self, frame: u32) -> (f64, f64) {
        let t = self.progress(frame);
        (
            self.start.0 + (self.end.0 - self.start.0) * t,
            self.start.1 + (self.end.1 - self.start.1) * t,
        )
    }

    pub fn camera(&self, frame: u32) -> PlanetCamera {
        let (lat, lon) = self.ground(frame);
        PlanetCamera::above(
            self.radius,
            self.altitude(frame),
            lat.to_radians(),
            lon.to_radians(),
            self.end_tilt * self.progress(frame),
            self.fov_y,
            self.aspect_ratio,
        )
    }

    /// Tile at `level` directly below the camera.
    pub fn ground_tile(&self, frame: u32, level: u8) -> Option<TileKey> {
        let (lat, lon) = self.ground(frame);
        TileKey::containing(&[TexCoord::from_degrees(lat, lon.rem_euclid(360.0))], level)
    }
}
