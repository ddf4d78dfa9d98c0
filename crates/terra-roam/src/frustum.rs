//! Hierarchical frustum classification of triangle wedges.
//!
//! Planes are extracted from a reverse-Z view-projection matrix in the planet
//! frame. A wedge that is fully inside a plane sets that plane's bit in the
//! inside mask, and children inherit the mask so they never retest it.

use glam::{DMat4, DVec3, DVec4};

const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

const ALL_PLANES: u8 = 0b11_1111;

/// A view frustum as six inward-pointing, normalised planes.
#[derive(Clone, Debug)]
pub struct Frustum {
    planes: [DVec4; 6],
}

impl Frustum {
    /// Extract planes from a combined view-projection matrix
    /// (Gribb-Hartmann), assuming reverse-Z depth.
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [DVec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        // Reverse-Z: near maps to z = w, far to z = 0.
        planes[NEAR] = rows[3] - rows[2];
        planes[FAR] = rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Signed distance of `point` to plane `index`; positive is inside.
    pub fn distance(&self, index: usize, point: DVec3) -> f64 {
        let plane = self.planes[index];
        plane.truncate().dot(point) + plane.w
    }

    pub fn planes(&self) -> &[DVec4; 6] {
        &self.planes
    }
}

/// Result of classifying one wedge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WedgeClass {
    /// Every point is inside every plane.
    Inside,
    /// Every point is outside `plane`.
    Outside { plane: u8 },
    /// Straddles; `inside_mask` holds the planes that fully contain it.
    Intersecting { inside_mask: u8 },
}

/// Frustum classifier with a running count of plane evaluations.
pub struct FrustumCuller {
    frustum: Frustum,
    plane_tests: u64,
}

impl FrustumCuller {
    pub fn new(view_projection: &DMat4) -> Self {
        Self {
            frustum: Frustum::from_view_projection(view_projection),
            plane_tests: 0,
        }
    }

    pub fn set_view_projection(&mut self, view_projection: &DMat4) {
        self.frustum = Frustum::from_view_projection(view_projection);
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Plane evaluations since the last reset. One per (wedge, plane) pair.
    pub fn plane_tests(&self) -> u64 {
        self.plane_tests
    }

    pub fn reset_counters(&mut self) {
        self.plane_tests = 0;
    }

    /// Classify `wedge`, skipping planes already set in `inside_mask` and
    /// starting the scan at `first_plane`.
    pub fn classify(&mut self, wedge: &[DVec3; 6], inside_mask: u8, first_plane: u8) -> WedgeClass {
        let mut mask = inside_mask & ALL_PLANES;
        for k in 0..6u8 {
            let plane = (first_plane + k) % 6;
            let bit = 1 << plane;
            if mask & bit != 0 {
                continue;
            }
            self.plane_tests += 1;
            let inside = wedge
                .iter()
                .filter(|p| self.frustum.distance(plane as usize, **p) >= 0.0)
                .count();
            if inside == 0 {
                return WedgeClass::Outside { plane };
            }
            if inside == wedge.len() {
                mask |= bit;
            }
        }
        if mask == ALL_PLANES {
            WedgeClass::Inside
        } else {
            WedgeClass::Intersecting { inside_mask: mask }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_vp() -> DMat4 {
        let view = DMat4::look_to_rh(DVec3::ZERO, DVec3::NEG_Z, DVec3::Y);
        let proj = DMat4::perspective_rh(std::f64::consts::FRAC_PI_4, 16.0 / 9.0, 1000.0, 0.1);
        proj * view
    }

    fn wedge_around(center: DVec3, half: f64) -> [DVec3; 6] {
        [
            center + DVec3::new(-half, -half, -half),
            center + DVec3::new(half, -half, -half),
            center + DVec3::new(0.0, half, -half),
            center + DVec3::new(-half, -half, half),
            center + DVec3::new(half, -half, half),
            center + DVec3::new(0.0, half, half),
        ]
    }

    #[test]
    fn test_planes_are_normalised() {
        let frustum = Frustum::from_view_projection(&camera_vp());
        for plane in frustum.planes() {
            assert!((plane.truncate().length() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_wedge_in_front_is_inside() {
        let mut culler = FrustumCuller::new(&camera_vp());
        let class = culler.classify(&wedge_around(DVec3::new(0.0, 0.0, -10.0), 1.0), 0, 0);
        assert_eq!(class, WedgeClass::Inside);
        assert_eq!(culler.plane_tests(), 6);
    }

    #[test]
    fn test_wedge_behind_is_outside() {
        let mut culler = FrustumCuller::new(&camera_vp());
        let class = culler.classify(&wedge_around(DVec3::new(0.0, 0.0, 10.0), 1.0), 0, 0);
        assert!(matches!(class, WedgeClass::Outside { .. }));
    }

    #[test]
    fn test_beyond_far_plane_is_outside() {
        let mut culler = FrustumCuller::new(&camera_vp());
        let class = culler.classify(&wedge_around(DVec3::new(0.0, 0.0, -2000.0), 1.0), 0, 0);
        assert_eq!(class, WedgeClass::Outside { plane: FAR as u8 });
    }

    #[test]
    fn test_hint_plane_is_tested_first() {
        let mut culler = FrustumCuller::new(&camera_vp());
        let wedge = wedge_around(DVec3::new(1000.0, 0.0, -5.0), 1.0);
        let class = culler.classify(&wedge, 0, RIGHT as u8);
        assert_eq!(class, WedgeClass::Outside { plane: RIGHT as u8 });
        assert_eq!(culler.plane_tests(), 1);
    }

    #[test]
    fn test_inherited_mask_skips_planes() {
        let mut culler = FrustumCuller::new(&camera_vp());
        let wedge = wedge_around(DVec3::new(0.0, 0.0, -10.0), 1.0);
        let class = culler.classify(&wedge, 0b00_1111, 0);
        assert_eq!(class, WedgeClass::Inside);
        assert_eq!(culler.plane_tests(), 2);
        culler.reset_counters();
        assert_eq!(culler.plane_tests(), 0);
    }

    #[test]
    fn test_straddling_wedge_reports_partial_mask() {
        let mut culler = FrustumCuller::new(&camera_vp());
        let wedge = wedge_around(DVec3::new(0.0, 0.0, -10.0), 100.0);
        match culler.classify(&wedge, 0, 0) {
            WedgeClass::Intersecting { inside_mask } => {
                assert_ne!(inside_mask, ALL_PLANES);
                assert_ne!(inside_mask & (1 << FAR), 0);
            }
            other => panic!("expected intersecting, got {other:?}"),
        }
    }
}
