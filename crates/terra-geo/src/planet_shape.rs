//! Planet radii and conversions between surface coordinates and planet-frame positions.

use glam::DVec3;

use crate::tex_coord::TexCoord;

/// Radial extent of the planet surface.
///
/// Every surface point lies between `min_radius` (elevation ratio 0) and
/// `max_radius` (elevation ratio 1). Units are metres in the planet frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlanetShape {
    pub min_radius: f64,
    pub max_radius: f64,
}

impl PlanetShape {
    /// Construct a planet shape.
    ///
    /// # Panics
    ///
    /// Panics if `min_radius` is not positive or `max_radius < min_radius`.
    pub fn new(min_radius: f64, max_radius: f64) -> Self {
        assert!(
            min_radius > 0.0,
            "Planet min radius must be positive, got {min_radius}"
        );
        assert!(
            max_radius >= min_radius,
            "Planet max radius {max_radius} is below min radius {min_radius}"
        );
        Self {
            min_radius,
            max_radius,
        }
    }

    /// Earth-like preset: 6,371 km base radius with 20 km of relief.
    pub fn earth_like() -> Self {
        Self::new(6_371_000.0, 6_391_000.0)
    }

    /// Radial distance between the lowest and highest possible surface.
    pub fn relief(&self) -> f64 {
        self.max_radius - self.min_radius
    }

    /// Radius for an elevation ratio in `[0, 1]`.
    pub fn radius_at(&self, ratio: f64) -> f64 {
        self.min_radius + ratio.clamp(0.0, 1.0) * self.relief()
    }

    /// Elevation ratio of a point at the given distance from the centre.
    pub fn ratio_at(&self, radius: f64) -> f64 {
        if self.relief() <= 0.0 {
            return 0.0;
        }
        ((radius - self.min_radius) / self.relief()).clamp(0.0, 1.0)
    }

    /// Planet-frame position of a surface coordinate at the given elevation ratio.
    pub fn surface_point(&self, tc: TexCoord, ratio: f64) -> DVec3 {
        tc.direction() * self.radius_at(ratio)
    }
}

/// Unit direction for a latitude/longitude pair in radians. Z is the polar axis.
pub fn direction_from_lat_lon(lat: f64, lon: f64) -> DVec3 {
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
}

/// Latitude and longitude (radians, longitude in `[0, TAU)`) of a planet-frame direction.
pub fn lat_lon_from_direction(dir: DVec3) -> (f64, f64) {
    let len = dir.length();
    if len <= f64::EPSILON {
        return (0.0, 0.0);
    }
    let lat = (dir.z / len).clamp(-1.0, 1.0).asin();
    let lon = dir.y.atan2(dir.x).rem_euclid(std::f64::consts::TAU);
    (lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_for_ratio_endpoints() {
        let shape = PlanetShape::new(100.0, 110.0);
        assert_eq!(shape.radius_at(0.0), 100.0);
        assert_eq!(shape.radius_at(1.0), 110.0);
        assert_eq!(shape.radius_at(2.0), 110.0);
        assert!((shape.ratio_at(105.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_direction_round_trip() {
        let lat = 0.3_f64;
        let lon = 4.0_f64;
        let (lat2, lon2) = lat_lon_from_direction(direction_from_lat_lon(lat, lon));
        assert!((lat - lat2).abs() < 1e-12);
        assert!((lon - lon2).abs() < 1e-12);
    }

    #[test]
    fn test_north_pole_is_positive_z() {
        let dir = direction_from_lat_lon(std::f64::consts::FRAC_PI_2, 1.0);
        assert!((dir - DVec3::Z).length() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "min radius must be positive")]
    fn test_zero_radius_panics() {
        PlanetShape::new(0.0, 1.0);
    }
}
