//! Fixed-capacity arena of triangle nodes.

use std::ops::{Index, IndexMut};

use crate::error::BinTreeError;
use crate::node::{NodeId, NodeState, TriNode};

/// Arena of [`TriNode`]s addressed by [`NodeId`].
///
/// Slots are created lazily up to `capacity` and recycled through a free list.
/// Allocation never grows past the capacity.
pub struct NodePool {
    nodes: Vec<TriNode>,
    free: Vec<NodeId>,
    capacity: usize,
}

impl NodePool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity.min(1 << 16)),
            free: Vec::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Nodes currently in use.
    pub fn live(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Slots still available for allocation.
    pub fn available(&self) -> usize {
        self.capacity - self.live()
    }

    pub fn alloc(&mut self, node: TriNode) -> Result<NodeId, BinTreeError> {
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = node;
            return Ok(id);
        }
        if self.nodes.len() >= self.capacity {
            return Err(BinTreeError::PoolExhausted {
                capacity: self.capacity,
            });
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        Ok(id)
    }

    pub fn release(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.index()];
        debug_assert!(node.state != NodeState::Free, "double free of {id:?}");
        node.state = NodeState::Free;
        node.base = None;
        node.left = None;
        node.right = None;
        self.free.push(id);
    }

    pub fn get(&self, id: NodeId) -> Option<&TriNode> {
        self.nodes
            .get(id.index())
            .filter(|n| n.state != NodeState::Free)
    }

    /// Iterate over live nodes.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TriNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.state != NodeState::Free)
            .map(|(i, n)| (NodeId(i as u32), n))
    }
}

impl Index<NodeId> for NodePool {
    type Output = TriNode;

    fn index(&self, id: NodeId) -> &TriNode {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for NodePool {
    fn index_mut(&mut self, id: NodeId) -> &mut TriNode {
        &mut self.nodes[id.index()]
    }
}
