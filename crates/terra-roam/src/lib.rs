//! Real-time optimally adapting mesh (ROAM) for a whole planet.
//!
//! A triangle bintree seeded from an octahedron is split and merged every frame
//! under a screen-space error metric and a node budget. Visibility is resolved
//! hierarchically against the view frustum using per-level wedge bounds, and an
//! optional precomputed variance table seeds split priorities without live
//! elevation queries.

mod bintree;
mod error;
mod frustum;
mod node;
mod pool;
mod scheduler;
mod variance;
mod wedge;

#[cfg(test)]
pub(crate) mod test_support;

pub use bintree::{BinTreeParams, TriangleBinTree};
pub use error::{BinTreeError, VarianceError};
pub use frustum::{Frustum, FrustumCuller, WedgeClass};
pub use node::{CullState, NodeId, NodeState, TriNode, Vertex, Visibility};
pub use pool::NodePool;
pub use scheduler::{FrameStats, RefinementParams, RefinementScheduler, ViewCenterBoost, Viewpoint};
pub use variance::{
    MAX_TABLE_LEVEL, VarianceEntry, VarianceTable, level_offset, total_nodes_for_level,
    tris_for_level,
};
pub use wedge::WedgeTable;
