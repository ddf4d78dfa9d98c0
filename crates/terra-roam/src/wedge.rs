//! Per-level radial margins bounding a triangle's surface patch.

use glam::DVec3;
use terra_geo::PlanetShape;

use crate::node::TriNode;

/// Radial margin per bintree level.
///
/// A node's wedge is its three corners pushed inward and outward along their
/// radii by the margin of its level. The margin covers the relief range plus
/// the bulge of the sphere over the flat triangle, and halves every two levels
/// as edge lengths do.
#[derive(Clone, Debug)]
pub struct WedgeTable {
    margins: Vec<f64>,
}

impl WedgeTable {
    pub fn new(shape: &PlanetShape, max_level: u8) -> Self {
        let margins = (0..=max_level as i32 + 1)
            .map(|level| {
                let scale = 0.5f64.powi(level / 2);
                // Octant edges span a quarter turn.
                let edge_angle = std::f64::consts::FRAC_PI_2 * scale;
                let bulge = shape.max_radius * (1.0 - edge_angle.cos());
                shape.relief() * scale + bulge
            })
            .collect();
        Self { margins }
    }

    pub fn margin(&self, level: u8) -> f64 {
        let last = self.margins.len() - 1;
        self.margins[(level as usize).min(last)]
    }

    /// The six wedge points of `node`.
    pub fn wedge(&self, node: &TriNode) -> [DVec3; 6] {
        let m = self.margin(node.level);
        let push = |p: DVec3, delta: f64| {
            let r = p.length();
            if r <= f64::EPSILON {
                p
            } else {
                p * ((r + delta).max(0.0) / r)
            }
        };
        let [a, b, c] = [node.p1.position, node.p2.position, node.p3.position];
        [
            push(a, -m),
            push(b, -m),
            push(c, -m),
            push(a, m),
            push(b, m),
            push(c, m),
        ]
    }
}
