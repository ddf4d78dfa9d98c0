//! The octahedral triangle bintree and its split/merge operations.
//!
//! Nodes live in a [`NodePool`] and refer to each other by [`NodeId`]. Every
//! split of a node whose base neighbour shares its hypotenuse also splits that
//! neighbour, so the leaves always form a crack-free mesh. Splitting a node
//! whose base neighbour is one level coarser first splits the neighbour.

use std::sync::Arc;

use glam::DVec3;
use terra_geo::{
    BASE_TILE_LEVEL, MAX_TILE_LEVEL, PlanetShape, TEX_S_FULL, TEX_T_FULL, TexCoord,
    TileDataSource, TileKey,
};

use crate::error::BinTreeError;
use crate::node::{CullState, NodeId, NodeState, TriNode, Vertex, Visibility};
use crate::pool::NodePool;
use crate::variance::{
    MAX_TABLE_LEVEL, VarianceEntry, VarianceTable, level_offset, total_nodes_for_level,
};

/// Construction parameters of a [`TriangleBinTree`].
#[derive(Clone, Debug)]
pub struct BinTreeParams {
    /// Deepest level the scheduler may split to.
    pub max_level: u8,
    /// Finest tile level a node's texture may come from.
    pub max_texture_level: u8,
    /// Fixed node pool capacity.
    pub pool_capacity: usize,
}

impl Default for BinTreeParams {
    fn default() -> Self {
        Self {
            max_level: 30,
            max_texture_level: MAX_TILE_LEVEL,
            pool_capacity: 1 << 16,
        }
    }
}

/// Adaptive triangle bintree over the whole planet.
pub struct TriangleBinTree {
    pool: NodePool,
    roots: [NodeId; 8],
    shape: PlanetShape,
    source: Arc<dyn TileDataSource>,
    variance: Option<Arc<VarianceTable>>,
    params: BinTreeParams,
}

impl TriangleBinTree {
    /// Seed the tree with the eight octahedron faces.
    ///
    /// Roots `0..4` are the northern faces, in order of longitude, and roots
    /// `4..8` their mirrors across the equator.
    pub fn new(
        shape: PlanetShape,
        source: Arc<dyn TileDataSource>,
        variance: Option<Arc<VarianceTable>>,
        params: BinTreeParams,
    ) -> Result<Self, BinTreeError> {
        let mut pool = NodePool::with_capacity(params.pool_capacity);
        let quarter = TEX_S_FULL / 4;
        let vertex = |tex: TexCoord, position: DVec3| Vertex { position, tex };

        let elevation = |tex: TexCoord| {
            let ratio = source.displacement(tex.latitude(), tex.longitude(), 0);
            shape.surface_point(tex, ratio)
        };
        let north_pos = elevation(TexCoord::new(0, TEX_T_FULL));
        let south_pos = elevation(TexCoord::new(0, 0));
        let mut equator: Vec<Vertex> = (0..4)
            .map(|k| {
                let tex = TexCoord::new(k * quarter, TEX_T_FULL / 2);
                vertex(tex, elevation(tex))
            })
            .collect();
        // The seam vertex shares the 0° position but keeps s at full turn.
        equator.push(vertex(
            TexCoord::new(TEX_S_FULL, TEX_T_FULL / 2),
            equator[0].position,
        ));

        let mut tree = Self {
            pool: NodePool::with_capacity(0),
            roots: [NodeId(0); 8],
            shape,
            source: source.clone(),
            variance,
            params,
        };

        let mut roots = [NodeId(0); 8];
        for k in 0..4u32 {
            let pole_s = k * quarter + quarter / 2;
            let north = vertex(TexCoord::new(pole_s, TEX_T_FULL), north_pos);
            let south = vertex(TexCoord::new(pole_s, 0), south_pos);
            let (e0, e1) = (equator[k as usize], equator[k as usize + 1]);
            for (slot, corners) in [(k, [north, e0, e1]), (k + 4, [south, e1, e0])] {
                let tile = tree.tile_for(0, [corners[0].tex, corners[1].tex, corners[2].tex]);
                let node = TriNode::new(
                    corners,
                    0,
                    0.0,
                    Some(slot),
                    tile,
                    CullState::default(),
                );
                roots[slot as usize] = pool.alloc(node)?;
            }
        }

        for k in 0..4 {
            let next = (k + 1) % 4;
            let prev = (k + 3) % 4;
            let n = &mut pool[roots[k]];
            n.base = Some(roots[k + 4]);
            n.left = Some(roots[next]);
            n.right = Some(roots[prev]);
            let s = &mut pool[roots[k + 4]];
            s.base = Some(roots[k]);
            s.left = Some(roots[prev + 4]);
            s.right = Some(roots[next + 4]);
        }

        tree.pool = pool;
        tree.roots = roots;
        // Roots have no parent and measure their own split.
        for root in roots {
            let apex = tree.apex_for(root);
            let node = &tree.pool[root];
            let error_sq =
                (apex.position - (node.p2.position + node.p3.position) * 0.5).length_squared();
            tree.pool[root].error_sq = error_sq;
        }

        tracing::info!(
            pool_capacity = tree.pool.capacity(),
            max_level = tree.params.max_level,
            variance_levels = tree.variance.as_ref().map(|t| t.max_level()),
            "Triangle bintree seeded"
        );
        Ok(tree)
    }

    pub fn roots(&self) -> [NodeId; 8] {
        self.roots
    }

    pub fn node(&self, id: NodeId) -> &TriNode {
        &self.pool[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut TriNode {
        &mut self.pool[id]
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    pub fn live_nodes(&self) -> usize {
        self.pool.live()
    }

    pub fn shape(&self) -> &PlanetShape {
        &self.shape
    }

    pub fn params(&self) -> &BinTreeParams {
        &self.params
    }

    pub fn variance_table(&self) -> Option<&VarianceTable> {
        self.variance.as_deref()
    }

    fn table_entry(&self, index: Option<u32>) -> Option<VarianceEntry> {
        self.variance.as_ref()?.get(index?)
    }

    /// Finest tile at or below the node's nominal texture level that holds all
    /// three corners.
    fn tile_for(&self, level: u8, tex: [TexCoord; 3]) -> TileKey {
        let max = self.params.max_texture_level.max(BASE_TILE_LEVEL);
        let mut tl = (BASE_TILE_LEVEL as u32 + level as u32 / 2).min(max as u32) as u8;
        loop {
            if let Some(key) = TileKey::containing(&tex, tl) {
                return key;
            }
            if tl <= BASE_TILE_LEVEL {
                let x = (tex[0].s / TileKey::span(BASE_TILE_LEVEL)).min(1);
                return TileKey::new(x, 0, BASE_TILE_LEVEL);
            }
            tl -= 1;
        }
    }

    /// New vertex on the hypotenuse of `id`, lifted to the surface.
    fn apex_for(&self, id: NodeId) -> Vertex {
        let node = &self.pool[id];
        let tex = TexCoord::midpoint(node.p2.tex, node.p3.tex);
        let ratio = match self.table_entry(node.variance_index) {
            Some(entry) => entry.ratio(),
            None => self
                .source
                .displacement(tex.latitude(), tex.longitude(), node.level + 1),
        };
        Vertex {
            position: self.shape.surface_point(tex, ratio),
            tex,
        }
    }

    /// Split `id` and, when they share a hypotenuse, its base neighbour.
    ///
    /// Returns `Ok(false)` when `id` is already split. On pool exhaustion the
    /// tree is left unchanged apart from any coarser forced splits that
    /// completed.
    pub fn split(&mut self, id: NodeId) -> Result<bool, BinTreeError> {
        if !self.pool[id].is_leaf() {
            return Ok(false);
        }
        if let Some(base) = self.pool[id].base {
            if self.pool[base].base != Some(id) {
                self.split(base)?;
            }
        }

        let base = self.pool[id].base;
        if let Some(b) = base {
            let partner = &self.pool[b];
            if partner.base != Some(id) || !partner.is_leaf() {
                debug_assert!(false, "{id:?} and {b:?} do not form a diamond");
                return Err(BinTreeError::Inconsistent(format!(
                    "{id:?} and {b:?} do not form a diamond"
                )));
            }
        }

        let needed = if base.is_some() { 4 } else { 2 };
        if self.pool.available() < needed {
            return Err(BinTreeError::PoolExhausted {
                capacity: self.pool.capacity(),
            });
        }

        let apex = self.apex_for(id).position;
        let (lc, rc) = self.split_half(id, apex)?;
        if let Some(b) = base {
            let (blc, brc) = self.split_half(b, apex)?;
            self.pool[lc].right = Some(brc);
            self.pool[rc].left = Some(blc);
            self.pool[blc].right = Some(rc);
            self.pool[brc].left = Some(lc);
        }
        Ok(true)
    }

    fn split_half(
        &mut self,
        id: NodeId,
        apex_position: DVec3,
    ) -> Result<(NodeId, NodeId), BinTreeError> {
        let parent = self.pool[id].clone();
        // Each half keeps its own texture midpoint; across the seam they differ.
        let apex = Vertex {
            position: apex_position,
            tex: TexCoord::midpoint(parent.p2.tex, parent.p3.tex),
        };
        let midpoint = (parent.p2.position + parent.p3.position) * 0.5;
        let displacement_sq = (apex_position - midpoint).length_squared();

        let left = self.make_child(&parent, [apex, parent.p3, parent.p1], false, displacement_sq);
        let right = self.make_child(&parent, [apex, parent.p1, parent.p2], true, displacement_sq);
        let lc = self.pool.alloc(left)?;
        let rc = self.pool.alloc(right)?;

        self.pool[lc].base = parent.left;
        self.pool[lc].left = Some(rc);
        self.pool[rc].base = parent.right;
        self.pool[rc].right = Some(lc);
        if let Some(l) = parent.left {
            self.relink(l, id, lc)?;
        }
        if let Some(r) = parent.right {
            self.relink(r, id, rc)?;
        }

        let node = &mut self.pool[id];
        node.state = NodeState::Split {
            left: lc,
            right: rc,
            mergeable: false,
        };
        node.displacement_sq = Some(displacement_sq);
        node.visible = false;
        Ok((lc, rc))
    }

    fn make_child(
        &self,
        parent: &TriNode,
        corners: [Vertex; 3],
        right: bool,
        parent_displacement_sq: f64,
    ) -> TriNode {
        let level = parent.level + 1;
        let index = child_index(parent.variance_index, parent.level, right);
        let error_sq = self
            .table_entry(parent.variance_index)
            .map(|e| e.displacement_sq(self.shape.min_radius))
            .unwrap_or(parent_displacement_sq);
        let tile = self.tile_for(level, [corners[0].tex, corners[1].tex, corners[2].tex]);
        let mut node = TriNode::new(corners, level, error_sq, index, tile, parent.cull);
        node.contains_view = parent.contains_view;
        node
    }

    fn relink(&mut self, neighbor: NodeId, old: NodeId, new: NodeId) -> Result<(), BinTreeError> {
        if self.pool[neighbor].replace_link(old, new) {
            return Ok(());
        }
        debug_assert!(false, "{neighbor:?} has no link to {old:?}");
        Err(BinTreeError::Inconsistent(format!(
            "{neighbor:?} has no link to {old:?}"
        )))
    }

    fn children_are_leaves(&self, id: NodeId) -> bool {
        match self.pool[id].children() {
            Some((l, r)) => self.pool[l].is_leaf() && self.pool[r].is_leaf(),
            None => false,
        }
    }

    /// True when `id` and its diamond partner both have leaf children only.
    pub fn can_merge(&self, id: NodeId) -> bool {
        if self.pool.get(id).is_none() || !self.children_are_leaves(id) {
            return false;
        }
        match self.pool[id].base {
            None => true,
            Some(b) => self.pool[b].base == Some(id) && self.children_are_leaves(b),
        }
    }

    /// Undo the split of `id` and its diamond partner.
    ///
    /// Returns `Ok(false)` when the pair cannot be merged.
    pub fn merge(&mut self, id: NodeId) -> Result<bool, BinTreeError> {
        if !self.can_merge(id) {
            return Ok(false);
        }
        let base = self.pool[id].base;
        self.merge_half(id)?;
        if let Some(b) = base {
            self.merge_half(b)?;
        }
        Ok(true)
    }

    fn merge_half(&mut self, id: NodeId) -> Result<(), BinTreeError> {
        let Some((lc, rc)) = self.pool[id].children() else {
            return Err(BinTreeError::Inconsistent(format!("{id:?} has no children")));
        };
        let left = self.pool[lc].base;
        let right = self.pool[rc].base;
        if let Some(l) = left {
            self.relink(l, lc, id)?;
        }
        if let Some(r) = right {
            self.relink(r, rc, id)?;
        }

        let node = &mut self.pool[id];
        node.left = left;
        node.right = right;
        node.state = NodeState::Leaf;
        self.pool.release(lc);
        self.pool.release(rc);
        Ok(())
    }

    /// Split every node of level `<= level`.
    ///
    /// Leaves `tris_for_level(level + 1)` live nodes.
    pub fn force_split_to(&mut self, level: u8) -> Result<(), BinTreeError> {
        for l in 0..=level {
            let pending: Vec<NodeId> = self
                .pool
                .iter()
                .filter(|(_, n)| n.level == l && n.is_leaf())
                .map(|(id, _)| id)
                .collect();
            for id in pending {
                self.split(id)?;
            }
            tracing::debug!(level = l, live = self.pool.live(), "Forced split pass");
        }
        Ok(())
    }

    /// Quantised entries for every statically addressed node of levels
    /// `0..=max_level`. Nodes that are not split contribute zero entries.
    pub fn variance_entries(&self, max_level: u8) -> Vec<VarianceEntry> {
        let mut entries = vec![VarianceEntry::default(); total_nodes_for_level(max_level)];
        for (_, node) in self.pool.iter() {
            let (Some(index), Some((left, _))) = (node.variance_index, node.children()) else {
                continue;
            };
            if let Some(slot) = entries.get_mut(index as usize) {
                let ratio = self.shape.ratio_at(self.pool[left].p1.position.length());
                *slot = VarianceEntry::encode(
                    node.displacement_sq.unwrap_or(0.0),
                    self.shape.min_radius,
                    ratio,
                );
            }
        }
        entries
    }

    /// Leaves reachable from the roots without entering an out-of-frustum subtree.
    pub fn collect_visible_leaves(&self, out: &mut Vec<NodeId>) {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.pool[id];
            if node.cull.visibility == Visibility::Outside {
                continue;
            }
            match node.state {
                NodeState::Split { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
                NodeState::Leaf => out.push(id),
                NodeState::Free => {}
            }
        }
    }

    /// Check neighbour reciprocity, tree shape and the live node count.
    pub fn validate(&self) -> Result<(), String> {
        let mut reachable = 0;
        let mut stack: Vec<NodeId> = self.roots.to_vec();
        while let Some(id) = stack.pop() {
            let node = self
                .pool
                .get(id)
                .ok_or_else(|| format!("{id:?} is reachable but free"))?;
            reachable += 1;
            match node.state {
                NodeState::Split { left, right, .. } => {
                    for child in [left, right] {
                        let c = self
                            .pool
                            .get(child)
                            .ok_or_else(|| format!("child {child:?} of {id:?} is free"))?;
                        if c.level != node.level + 1 {
                            return Err(format!("child {child:?} of {id:?} has level {}", c.level));
                        }
                        stack.push(child);
                    }
                    if let Some(b) = node.base {
                        let partner = &self.pool[b];
                        if partner.base == Some(id) && partner.is_leaf() {
                            return Err(format!("{id:?} is split but its diamond partner {b:?} is not"));
                        }
                    }
                }
                NodeState::Leaf => {
                    for link in [node.base, node.left, node.right].into_iter().flatten() {
                        let other = self
                            .pool
                            .get(link)
                            .ok_or_else(|| format!("{id:?} links to free node {link:?}"))?;
                        if !other.is_leaf() {
                            return Err(format!("leaf {id:?} links to split node {link:?}"));
                        }
                        if !other.links_to(id) {
                            return Err(format!("{link:?} does not link back to {id:?}"));
                        }
                        if other.level.abs_diff(node.level) > 1 {
                            return Err(format!(
                                "neighbours {id:?} and {link:?} differ by more than one level"
                            ));
                        }
                    }
                }
                NodeState::Free => return Err(format!("{id:?} is free")),
            }
        }
        if reachable != self.pool.live() {
            return Err(format!(
                "{reachable} nodes reachable but {} live",
                self.pool.live()
            ));
        }
        Ok(())
    }
}

/// Static index of a child, when its level is addressable.
fn child_index(parent: Option<u32>, parent_level: u8, right: bool) -> Option<u32> {
    let parent = parent? as usize;
    if parent_level >= MAX_TABLE_LEVEL {
        return None;
    }
    let local = parent - level_offset(parent_level);
    let index = level_offset(parent_level + 1) + 2 * local + right as usize;
    Some(index as u32)
}
