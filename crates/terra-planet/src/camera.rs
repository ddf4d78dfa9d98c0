//! A look-at camera in the planet frame.

use glam::{DMat4, DVec3};
use terra_roam::Viewpoint;

/// Perspective camera producing reverse-Z view-projections.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanetCamera {
    pub eye: DVec3,
    pub target: DVec3,
    pub up: DVec3,
    /// Vertical field of view in radians.
    pub fov_y: f64,
    /// Width / height.
    pub aspect_ratio: f64,
    pub near: f64,
    pub far: f64,
}

impl PlanetCamera {
    /// Camera `altitude` metres above the surface at `lat`/`lon` (radians),
    /// looking `tilt` radians away from straight down, towards the north.
    pub fn above(
        radius: f64,
        altitude: f64,
        lat: f64,
        lon: f64,
        tilt: f64,
        fov_y: f64,
        aspect_ratio: f64,
    ) -> Self {
        let up = terra_geo::direction_from_lat_lon(lat, lon);
        let north = DVec3::Z - up * up.z;
        let north = north.try_normalize().unwrap_or(DVec3::X);
        let eye = up * (radius + altitude);
        let look = (-up * tilt.cos() + north * tilt.sin()).normalize();
        let target = eye + look * altitude.max(1.0);
        let near = (altitude * 0.01).max(0.1);
        let far = (radius + altitude) * 4.0;
        Self {
            eye,
            target,
            up: if tilt.abs() < 1e-6 { north } else { up },
            fov_y,
            aspect_ratio,
            near,
            far,
        }
    }

    pub fn forward(&self) -> DVec3 {
        (self.target - self.eye).normalize_or_zero()
    }

    pub fn view_matrix(&self) -> DMat4 {
        DMat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Reverse-Z: near maps to depth 1 and far to depth 0.
    pub fn projection_matrix(&self) -> DMat4 {
        DMat4::perspective_rh(self.fov_y, self.aspect_ratio, self.far, self.near)
    }

    pub fn viewpoint(&self) -> Viewpoint {
        Viewpoint {
            eye: self.eye,
            forward: self.forward(),
            view_projection: self.projection_matrix() * self.view_matrix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nadir_camera_looks_down() {
        let camera = PlanetCamera::above(1000.0, 50.0, 0.3, 1.0, 0.0, 1.0, 1.5);
        let down = -terra_geo::direction_from_lat_lon(0.3, 1.0);
        assert!(camera.forward().dot(down) > 0.999);
        assert!((camera.eye.length() - 1050.0).abs() < 1e-9);
    }

    #[test]
    fn test_reverse_z_depth() {
        let camera = PlanetCamera::above(1000.0, 50.0, 0.0, 0.0, 0.0, 1.0, 1.0);
        let vp = camera.viewpoint().view_projection;
        let project = |p: DVec3| {
            let clip = vp * p.extend(1.0);
            clip.z / clip.w
        };
        let near_point = camera.eye + camera.forward() * (camera.near * 2.0);
        let far_point = camera.eye + camera.forward() * (camera.far * 0.5);
        assert!(project(near_point) > project(far_point));
    }
}
