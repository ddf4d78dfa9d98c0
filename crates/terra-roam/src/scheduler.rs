//! Per-frame split/merge scheduling under a screen-space error metric.

use glam::{DMat4, DVec3};
use terra_geo::PlanetShape;

use crate::bintree::TriangleBinTree;
use crate::error::BinTreeError;
use crate::frustum::{FrustumCuller, WedgeClass};
use crate::node::{CullState, NodeId, NodeState, TriNode, Visibility};
use crate::wedge::WedgeTable;

/// Extra priority for nodes under the centre of the view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViewCenterBoost {
    /// Multiply by `texture_level - 6`.
    #[default]
    TextureLevel,
    None,
}

#[derive(Clone, Debug)]
pub struct RefinementParams {
    /// Target projected size of a triangle's error, in pixels.
    pub pixels_per_triangle: f64,
    pub viewport_height: f64,
    /// Vertical field of view in radians.
    pub fov_y: f64,
    /// No split starts once this many nodes are live.
    pub triangle_budget: usize,
    pub max_level: u8,
    pub view_center_boost: ViewCenterBoost,
}

impl Default for RefinementParams {
    fn default() -> Self {
        Self {
            pixels_per_triangle: 4.0,
            viewport_height: 768.0,
            fov_y: 60f64.to_radians(),
            triangle_budget: 20_000,
            max_level: 30,
            view_center_boost: ViewCenterBoost::TextureLevel,
        }
    }
}

/// Camera state in the planet frame.
#[derive(Clone, Copy, Debug)]
pub struct Viewpoint {
    pub eye: DVec3,
    /// Unit view direction.
    pub forward: DVec3,
    /// Reverse-Z projection times view.
    pub view_projection: DMat4,
}

/// Counters for one `render_setup` pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub splits: u32,
    pub merges: u32,
    pub live_nodes: usize,
    pub plane_tests: u64,
    /// Nodes whose wedge tested fully inside the frustum.
    pub frustum_inside: u32,
    /// Nodes whose wedge tested fully outside.
    pub frustum_outside: u32,
}

#[derive(Clone, Copy)]
struct Inherited {
    visibility: Visibility,
    inside_mask: u8,
    contains_view: bool,
}

#[derive(Default)]
struct Frame {
    stats: FrameStats,
    splits_blocked: bool,
}

/// Drives the bintree toward the current viewpoint one frame at a time.
pub struct RefinementScheduler {
    params: RefinementParams,
    shape: PlanetShape,
    split_threshold: f64,
    merge_threshold: f64,
    culler: FrustumCuller,
    wedges: WedgeTable,
    viewpoint: Option<Viewpoint>,
    /// Surface direction under the centre of the view.
    view_center: Option<DVec3>,
}

impl RefinementScheduler {
    pub fn new(params: RefinementParams, shape: PlanetShape) -> Self {
        let wedges = WedgeTable::new(&shape, params.max_level);
        let mut scheduler = Self {
            shape,
            split_threshold: 0.0,
            merge_threshold: 0.0,
            culler: FrustumCuller::new(&DMat4::IDENTITY),
            wedges,
            viewpoint: None,
            view_center: None,
            params,
        };
        scheduler.calibrate(scheduler.params.viewport_height, scheduler.params.fov_y);
        scheduler
    }

    pub fn params(&self) -> &RefinementParams {
        &self.params
    }

    /// Replace the parameters and recalibrate the thresholds.
    pub fn set_params(&mut self, params: RefinementParams) {
        if params.max_level != self.params.max_level {
            self.wedges = WedgeTable::new(&self.shape, params.max_level);
        }
        self.params = params;
        self.calibrate(self.params.viewport_height, self.params.fov_y);
    }

    /// Recompute thresholds for a viewport height in pixels and vertical FOV in radians.
    pub fn calibrate(&mut self, viewport_height: f64, fov_y: f64) {
        self.params.viewport_height = viewport_height;
        self.params.fov_y = fov_y;
        let pixel_angle = 2.0 * (fov_y * 0.5).tan() / viewport_height.max(1.0);
        let split = self.params.pixels_per_triangle * pixel_angle;
        self.split_threshold = split * split;
        self.merge_threshold = self.split_threshold / 3.0;
        tracing::debug!(
            split = self.split_threshold,
            merge = self.merge_threshold,
            "Refinement thresholds calibrated"
        );
    }

    /// `(split, merge)` thresholds.
    pub fn thresholds(&self) -> (f64, f64) {
        (self.split_threshold, self.merge_threshold)
    }

    pub fn viewpoint(&self) -> Option<&Viewpoint> {
        self.viewpoint.as_ref()
    }

    pub fn set_viewpoint(&mut self, viewpoint: Viewpoint) {
        self.culler.set_view_projection(&viewpoint.view_projection);
        let radius = (self.shape.min_radius + self.shape.max_radius) * 0.5;
        self.view_center = ray_sphere(viewpoint.eye, viewpoint.forward, radius)
            .map(|hit| hit.normalize_or_zero());
        self.viewpoint = Some(viewpoint);
    }

    /// Walk the tree once: classify, then split or merge toward the thresholds.
    pub fn render_setup(&mut self, tree: &mut TriangleBinTree) -> FrameStats {
        let Some(view) = self.viewpoint else {
            return FrameStats {
                live_nodes: tree.live_nodes(),
                ..Default::default()
            };
        };

        self.culler.reset_counters();
        let mut frame = Frame::default();
        let root_state = Inherited {
            visibility: Visibility::Unknown,
            inside_mask: 0,
            contains_view: self.view_center.is_some(),
        };
        for root in tree.roots() {
            self.update(tree, root, root_state, view.eye, &mut frame);
        }

        frame.stats.plane_tests = self.culler.plane_tests();
        frame.stats.live_nodes = tree.live_nodes();

        if cfg!(debug_assertions) {
            if let Err(err) = tree.validate() {
                tracing::error!(%err, "Bintree invariant violated");
                panic!("bintree invariant violated: {err}");
            }
        }

        tracing::trace!(
            splits = frame.stats.splits,
            merges = frame.stats.merges,
            live = frame.stats.live_nodes,
            plane_tests = frame.stats.plane_tests,
            "Refinement frame"
        );
        frame.stats
    }

    fn update(
        &mut self,
        tree: &mut TriangleBinTree,
        id: NodeId,
        inherited: Inherited,
        eye: DVec3,
        frame: &mut Frame,
    ) {
        let cull = self.classify(tree.node(id), inherited, &mut frame.stats);
        let contains_view = inherited.contains_view && self.contains_view(tree.node(id));
        {
            let node = tree.node_mut(id);
            node.cull = cull;
            node.contains_view = contains_view;
            node.visible = false;
        }

        let state = tree.node(id).state;
        match state {
            NodeState::Leaf => {
                let priority = self.priority(tree.node(id), eye);
                if priority > self.split_threshold && self.may_split(tree, id, frame) {
                    match tree.split(id) {
                        Ok(true) => frame.stats.splits += 1,
                        Ok(false) => {}
                        Err(err @ BinTreeError::PoolExhausted { .. }) => {
                            tracing::warn!(%err, "Split skipped for the rest of the frame");
                            frame.splits_blocked = true;
                        }
                        Err(err) => {
                            tracing::error!(%err, "Split failed");
                            frame.splits_blocked = true;
                        }
                    }
                }
                let node = tree.node_mut(id);
                node.visible = node.is_leaf() && cull.visibility != Visibility::Outside;
            }
            NodeState::Split {
                left,
                right,
                mergeable,
            } => {
                if tree.can_merge(id) {
                    if self.diamond_priority(tree, id, eye) < self.merge_threshold {
                        if mergeable {
                            match tree.merge(id) {
                                Ok(true) => {
                                    frame.stats.merges += 1;
                                    let node = tree.node_mut(id);
                                    node.visible = cull.visibility != Visibility::Outside;
                                    return;
                                }
                                Ok(false) => {}
                                Err(err) => tracing::error!(%err, "Merge failed"),
                            }
                        } else {
                            set_mergeable(tree.node_mut(id), true);
                        }
                    } else if mergeable {
                        set_mergeable(tree.node_mut(id), false);
                    }
                } else if mergeable {
                    set_mergeable(tree.node_mut(id), false);
                }

                let down = Inherited {
                    visibility: cull.visibility,
                    inside_mask: cull.inside_mask,
                    contains_view,
                };
                self.update(tree, left, down, eye, frame);
                self.update(tree, right, down, eye, frame);
            }
            NodeState::Free => {}
        }
    }

    fn may_split(&self, tree: &TriangleBinTree, id: NodeId, frame: &Frame) -> bool {
        !frame.splits_blocked
            && tree.live_nodes() < self.params.triangle_budget
            && tree.node(id).level < self.params.max_level.min(tree.params().max_level)
            && tree.pool().available() >= 4
    }

    fn classify(&mut self, node: &TriNode, inherited: Inherited, stats: &mut FrameStats) -> CullState {
        let first_plane = node.cull.first_plane;
        match inherited.visibility {
            Visibility::Inside => CullState {
                visibility: Visibility::Inside,
                inside_mask: 0b11_1111,
                first_plane,
            },
            Visibility::Outside => CullState {
                visibility: Visibility::Outside,
                inside_mask: 0,
                first_plane,
            },
            Visibility::Unknown => {
                let wedge = self.wedges.wedge(node);
                match self
                    .culler
                    .classify(&wedge, inherited.inside_mask, first_plane)
                {
                    WedgeClass::Inside => {
                        stats.frustum_inside += 1;
                        CullState {
                            visibility: Visibility::Inside,
                            inside_mask: 0b11_1111,
                            first_plane,
                        }
                    }
                    WedgeClass::Outside { plane } => {
                        stats.frustum_outside += 1;
                        CullState {
                            visibility: Visibility::Outside,
                            inside_mask: 0,
                            first_plane: plane,
                        }
                    }
                    WedgeClass::Intersecting { inside_mask } => CullState {
                        visibility: Visibility::Unknown,
                        inside_mask,
                        first_plane,
                    },
                }
            }
        }
    }

    /// Whether the surface point under the view centre falls in `node`.
    fn contains_view(&self, node: &TriNode) -> bool {
        let Some(h) = self.view_center else {
            return false;
        };
        let [a, b, c] = [node.p1, node.p2, node.p3].map(|v| v.position.normalize_or_zero());
        if (a + b + c).dot(h) <= 0.0 {
            return false;
        }
        let s1 = a.cross(b).dot(h);
        let s2 = b.cross(c).dot(h);
        let s3 = c.cross(a).dot(h);
        (s1 >= 0.0 && s2 >= 0.0 && s3 >= 0.0) || (s1 <= 0.0 && s2 <= 0.0 && s3 <= 0.0)
    }

    /// Squared projected error of `node` seen from `eye`.
    pub fn priority(&self, node: &TriNode, eye: DVec3) -> f64 {
        if node.cull.visibility == Visibility::Outside {
            return 0.0;
        }
        let dist_sq = [node.p1, node.p2, node.p3]
            .iter()
            .map(|v| v.position.distance_squared(eye))
            .fold(f64::INFINITY, f64::min)
            .max(1e-12);
        let mut priority = node.error_sq / dist_sq;
        if node.contains_view && self.params.view_center_boost == ViewCenterBoost::TextureLevel {
            priority *= node.texture_level.saturating_sub(6).max(1) as f64;
        }
        priority
    }

    fn diamond_priority(&self, tree: &TriangleBinTree, id: NodeId, eye: DVec3) -> f64 {
        let node = tree.node(id);
        let own = self.priority(node, eye);
        match node.base {
            Some(b) => own.max(self.priority(tree.node(b), eye)),
            None => own,
        }
    }
}

fn set_mergeable(node: &mut TriNode, value: bool) {
    if let NodeState::Split { mergeable, .. } = &mut node.state {
        *mergeable = value;
    }
}

/// Nearest intersection of a ray with the origin-centred sphere.
fn ray_sphere(origin: DVec3, dir: DVec3, radius: f64) -> Option<DVec3> {
    let dir = dir.normalize_or_zero();
    let b = origin.dot(dir);
    let c = origin.length_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let t = if -b - sq >= 0.0 { -b - sq } else { -b + sq };
    (t >= 0.0).then(|| origin + dir * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bintree::BinTreeParams;
    use crate::test_support::{ConstantSource, flat_tree, shape};
    use crate::variance::{VarianceTable, tris_for_level};
    use std::collections::HashMap;
    use std::sync::Arc;
    use terra_geo::direction_from_lat_lon;

    fn viewpoint(eye: DVec3, forward: DVec3) -> Viewpoint {
        let up = if forward.cross(DVec3::Z).length_squared() < 1e-9 {
            DVec3::X
        } else {
            DVec3::Z
        };
        let view = DMat4::look_to_rh(eye, forward, up);
        let proj = DMat4::perspective_rh(60f64.to_radians(), 4.0 / 3.0, 1.0e7, 0.1);
        Viewpoint {
            eye,
            forward,
            view_projection: proj * view,
        }
    }

    fn scheduler(budget: usize, max_level: u8) -> RefinementScheduler {
        RefinementScheduler::new(
            RefinementParams {
                pixels_per_triangle: 2.0,
                viewport_height: 600.0,
                triangle_budget: budget,
                max_level,
                ..Default::default()
            },
            shape(),
        )
    }

    fn run_until_quiet(
        scheduler: &mut RefinementScheduler,
        tree: &mut TriangleBinTree,
        max_frames: usize,
    ) -> bool {
        let mut quiet = 0;
        for _ in 0..max_frames {
            let stats = scheduler.render_setup(tree);
            if stats.splits == 0 && stats.merges == 0 {
                quiet += 1;
                if quiet == 2 {
                    return true;
                }
            } else {
                quiet = 0;
            }
        }
        false
    }

    #[test]
    fn test_calibrate_thresholds() {
        let mut s = RefinementScheduler::new(
            RefinementParams {
                pixels_per_triangle: 4.0,
                ..Default::default()
            },
            shape(),
        );
        s.calibrate(100.0, std::f64::consts::FRAC_PI_2);
        let (split, merge) = s.thresholds();
        assert!((split - 0.0064).abs() < 1e-12);
        assert!((merge - split / 3.0).abs() < 1e-15);
    }

    #[test]
    fn test_set_params_recalibrates() {
        let mut s = scheduler(100, 10);
        let (split, _) = s.thresholds();
        s.set_params(RefinementParams {
            pixels_per_triangle: 4.0,
            viewport_height: 600.0,
            triangle_budget: 500,
            max_level: 14,
            ..Default::default()
        });
        let (doubled, merge) = s.thresholds();
        assert!((doubled - 4.0 * split).abs() <= 1e-12 * doubled);
        assert!((merge - doubled / 3.0).abs() <= 1e-15);
        assert_eq!(s.params().triangle_budget, 500);
        assert_eq!(s.params().max_level, 14);
    }

    #[test]
    fn test_no_viewpoint_is_a_no_op() {
        let mut tree = flat_tree(64);
        let stats = scheduler(100, 10).render_setup(&mut tree);
        assert_eq!(stats.live_nodes, 8);
        assert_eq!(stats.splits, 0);
    }

    #[test]
    fn test_whole_planet_inside_costs_only_root_tests() {
        let mut tree = flat_tree(4096);
        tree.force_split_to(3).expect("force split");
        let mut s = scheduler(100, 10);
        s.set_viewpoint(viewpoint(DVec3::new(20_000.0, 0.0, 0.0), DVec3::NEG_X));
        let stats = s.render_setup(&mut tree);
        assert_eq!(stats.frustum_inside, 8);
        assert_eq!(stats.plane_tests, 48);
        assert_eq!(stats.merges, 0);
    }

    #[test]
    fn test_looking_away_emits_nothing() {
        let mut tree = flat_tree(4096);
        tree.force_split_to(3).expect("force split");
        let mut s = scheduler(10_000, 10);
        s.set_viewpoint(viewpoint(DVec3::new(20_000.0, 0.0, 0.0), DVec3::X));
        let stats = s.render_setup(&mut tree);
        assert_eq!(stats.frustum_outside, 8);
        assert_eq!(stats.plane_tests, 8);
        assert_eq!(stats.splits, 0);

        let mut leaves = Vec::new();
        tree.collect_visible_leaves(&mut leaves);
        assert!(leaves.is_empty());
    }

    #[test]
    fn test_refines_toward_viewer_within_budget() {
        let budget = 600;
        let max_level = 12;
        let mut tree = flat_tree(2048);
        let mut s = scheduler(budget, max_level);
        let down = direction_from_lat_lon(20f64.to_radians(), 30f64.to_radians());
        s.set_viewpoint(viewpoint(down * 1080.0, -down));

        assert!(run_until_quiet(&mut s, &mut tree, 300));
        assert!(tree.live_nodes() > 8);
        assert!(tree.live_nodes() <= budget + 4 * (max_level as usize + 1));

        let mut leaves = Vec::new();
        tree.collect_visible_leaves(&mut leaves);
        assert!(!leaves.is_empty());
        let deepest = leaves.iter().map(|&id| tree.node(id).level()).max().unwrap_or(0);
        assert!(deepest >= 6, "deepest visible leaf at level {deepest}");
        assert!(leaves.iter().all(|&id| tree.node(id).is_visible()));
    }

    #[test]
    fn test_merge_waits_one_frame() {
        let mut tree = flat_tree(2048);
        let mut s = scheduler(600, 12);
        let down = direction_from_lat_lon(-10f64.to_radians(), 200f64.to_radians());
        s.set_viewpoint(viewpoint(down * 1080.0, -down));
        assert!(run_until_quiet(&mut s, &mut tree, 300));
        let refined = tree.live_nodes();

        s.set_viewpoint(viewpoint(down * 50_000.0, -down));
        let first = s.render_setup(&mut tree);
        assert_eq!(first.merges, 0);
        let second = s.render_setup(&mut tree);
        assert!(second.merges > 0);

        assert!(run_until_quiet(&mut s, &mut tree, 300));
        assert!(tree.live_nodes() < refined);
    }

    #[test]
    fn test_view_center_boost_scales_by_texture_level() {
        let mut tree = flat_tree(4096);
        tree.force_split_to(4).expect("force split");
        let id = tree
            .pool()
            .iter()
            .find(|(_, n)| n.is_leaf() && n.texture_level() > 7)
            .map(|(id, _)| id)
            .expect("deep leaf");
        tree.node_mut(id).contains_view = true;
        let eye = DVec3::new(5000.0, 0.0, 0.0);

        let boosted = scheduler(100, 10).priority(tree.node(id), eye);
        let mut plain = scheduler(100, 10);
        plain.params.view_center_boost = ViewCenterBoost::None;
        let base = plain.priority(tree.node(id), eye);
        let factor = (tree.node(id).texture_level() - 6) as f64;
        assert!((boosted - base * factor).abs() <= 1e-12 * boosted.abs());
    }

    #[test]
    fn test_variance_table_keeps_split_decisions() {
        let level = 5;
        let capacity = tris_for_level(level + 1);
        let mut live = flat_tree(capacity);
        live.force_split_to(level).expect("force split");
        let table = VarianceTable::new(level, live.variance_entries(level)).expect("table");

        let mut seeded = TriangleBinTree::new(
            shape(),
            Arc::new(ConstantSource(0.5)),
            Some(Arc::new(table)),
            BinTreeParams {
                pool_capacity: capacity,
                ..Default::default()
            },
        )
        .expect("tree");
        seeded.force_split_to(level).expect("force split");

        let mut s = scheduler(100_000, 20);
        s.params.pixels_per_triangle = 20.0;
        s.params.view_center_boost = ViewCenterBoost::None;
        s.calibrate(600.0, 60f64.to_radians());
        let (split, _) = s.thresholds();
        let down = direction_from_lat_lon(20f64.to_radians(), 30f64.to_radians());
        let eye = down * 1080.0;

        let leaves = |tree: &TriangleBinTree| -> HashMap<u32, (f64, f64)> {
            tree.pool()
                .iter()
                .filter(|(_, n)| n.is_leaf())
                .map(|(_, n)| {
                    let index = n.variance_index().expect("addressable");
                    (index, (n.error_sq(), s.priority(n, eye)))
                })
                .collect()
        };
        let live = leaves(&live);
        let seeded = leaves(&seeded);
        assert_eq!(live.len(), seeded.len());

        // Log2 quantisation keeps errors within half a power of two.
        let band = 1.5;
        let (mut splits, mut keeps) = (0, 0);
        for (index, &(live_error, live_priority)) in &live {
            let (seeded_error, seeded_priority) = seeded[index];
            let ratio = seeded_error / live_error;
            assert!((1.0 / band..=band).contains(&ratio), "node {index}: ratio {ratio}");
            if live_priority > split * band {
                assert!(seeded_priority > split, "node {index} no longer splits");
                splits += 1;
            } else if live_priority < split / band {
                assert!(seeded_priority < split, "node {index} now splits");
                keeps += 1;
            }
        }
        assert!(splits > 0 && keeps > 0, "{splits} splits, {keeps} keeps");
    }

    #[test]
    fn test_ray_sphere_hits_near_side() {
        let hit = ray_sphere(DVec3::new(10.0, 0.0, 0.0), DVec3::NEG_X, 2.0).expect("hit");
        assert!((hit - DVec3::new(2.0, 0.0, 0.0)).length() < 1e-12);
        assert!(ray_sphere(DVec3::new(10.0, 0.0, 0.0), DVec3::X, 2.0).is_none());
    }
}
