//! Triangle nodes stored in the [`NodePool`](crate::NodePool) arena.

use glam::DVec3;
use terra_geo::{TexCoord, TileKey};

/// Handle of a node inside the pool. Stable for the node's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A triangle corner: planet-frame position plus its surface coordinate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: DVec3,
    pub tex: TexCoord,
}

/// Structural state of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Slot is on the free list.
    Free,
    /// Live node without children.
    Leaf,
    /// Live node with both children present.
    Split {
        left: NodeId,
        right: NodeId,
        /// Set after one frame below the merge threshold.
        mergeable: bool,
    },
}

/// Frustum classification of a node's wedge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    /// Wedge straddles at least one plane; children must be tested.
    #[default]
    Unknown,
    /// Wedge lies entirely inside the frustum.
    Inside,
    /// Wedge lies entirely outside one plane.
    Outside,
}

/// Per-node culling state carried between frames and inherited by children.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullState {
    pub visibility: Visibility,
    /// Bit `i` set when the wedge is known to be inside plane `i`.
    pub inside_mask: u8,
    /// Plane that rejected this node last time; tested first.
    pub first_plane: u8,
}

/// One triangle of the bintree.
///
/// Corner `p1` is the apex, `p2`–`p3` the hypotenuse. The base neighbour lies
/// across `p2`–`p3`, the left neighbour across `p1`–`p3` and the right
/// neighbour across `p1`–`p2`.
#[derive(Clone, Debug)]
pub struct TriNode {
    pub(crate) p1: Vertex,
    pub(crate) p2: Vertex,
    pub(crate) p3: Vertex,
    pub(crate) base: Option<NodeId>,
    pub(crate) left: Option<NodeId>,
    pub(crate) right: Option<NodeId>,
    pub(crate) state: NodeState,
    pub(crate) level: u8,
    pub(crate) normal: DVec3,
    /// Squared displacement estimate used as the priority numerator.
    pub(crate) error_sq: f64,
    /// Squared distance between the apex created by splitting this node and
    /// the hypotenuse midpoint. Measured at split time.
    pub(crate) displacement_sq: Option<f64>,
    /// Static index into the variance table, when the level is addressable.
    pub(crate) variance_index: Option<u32>,
    pub(crate) texture_level: u8,
    pub(crate) tile: TileKey,
    pub(crate) cull: CullState,
    pub(crate) contains_view: bool,
    /// Leaf that was emitted last frame.
    pub(crate) visible: bool,
}

impl TriNode {
    pub(crate) fn new(
        corners: [Vertex; 3],
        level: u8,
        error_sq: f64,
        variance_index: Option<u32>,
        tile: TileKey,
        cull: CullState,
    ) -> Self {
        let [p1, p2, p3] = corners;
        let mut normal = (p2.position - p1.position)
            .cross(p3.position - p1.position)
            .normalize_or_zero();
        if normal.dot(p1.position) < 0.0 {
            normal = -normal;
        }
        Self {
            p1,
            p2,
            p3,
            base: None,
            left: None,
            right: None,
            state: NodeState::Leaf,
            level,
            normal,
            error_sq,
            displacement_sq: None,
            variance_index,
            texture_level: tile.level,
            tile,
            cull,
            contains_view: false,
            visible: false,
        }
    }

    pub fn corners(&self) -> [Vertex; 3] {
        [self.p1, self.p2, self.p3]
    }

    pub fn tex_coords(&self) -> [TexCoord; 3] {
        [self.p1.tex, self.p2.tex, self.p3.tex]
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_leaf(&self) -> bool {
        self.state == NodeState::Leaf
    }

    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        match self.state {
            NodeState::Split { left, right, .. } => Some((left, right)),
            _ => None,
        }
    }

    /// Neighbour links as `(base, left, right)`.
    pub fn neighbors(&self) -> (Option<NodeId>, Option<NodeId>, Option<NodeId>) {
        (self.base, self.left, self.right)
    }

    /// Outward unit normal of the flat triangle.
    pub fn normal(&self) -> DVec3 {
        self.normal
    }

    pub fn error_sq(&self) -> f64 {
        self.error_sq
    }

    pub fn displacement_sq(&self) -> Option<f64> {
        self.displacement_sq
    }

    pub fn variance_index(&self) -> Option<u32> {
        self.variance_index
    }

    /// Tile level the node's texture is drawn from.
    pub fn texture_level(&self) -> u8 {
        self.texture_level
    }

    /// Tile that fully contains the node at its texture level.
    pub fn tile(&self) -> TileKey {
        self.tile
    }

    pub fn cull(&self) -> CullState {
        self.cull
    }

    pub fn visibility(&self) -> Visibility {
        self.cull.visibility
    }

    pub fn contains_view(&self) -> bool {
        self.contains_view
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Replace whichever link currently points at `old` with `new`.
    ///
    /// Returns false when no link matched.
    pub(crate) fn replace_link(&mut self, old: NodeId, new: NodeId) -> bool {
        if self.base == Some(old) {
            self.base = Some(new);
        } else if self.left == Some(old) {
            self.left = Some(new);
        } else if self.right == Some(old) {
            self.right = Some(new);
        } else {
            return false;
        }
        true
    }

    pub(crate) fn links_to(&self, other: NodeId) -> bool {
        self.base == Some(other) || self.left == Some(other) || self.right == Some(other)
    }
}
