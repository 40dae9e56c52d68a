//! Dirty Tree
//!
//! Sparse projection of the adapter tree holding only nodes whose status still
//! carries a dirty facet. It owns nothing: it is fed by committed adapter tree
//! operations (as a [`TreeObserver`]) and can be rebuilt from the tree at any
//! time.

use super::node::NodeStatus;
use super::operation::{CommittedOperation, OperationKind, TreeObserver};
use super::AdapterTree;
use crate::types::NodeId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// DirtyTreeNode: id and dirty facets of a node needing attention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyTreeNode {
    pub id: NodeId,
    pub parent_id: NodeId,
    pub status: NodeStatus,
}

#[derive(Default)]
pub struct DirtyTree {
    nodes: RwLock<HashMap<NodeId, DirtyTreeNode>>,
}

impl DirtyTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<DirtyTreeNode> {
        self.nodes.read().get(&id).copied()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Ids currently needing attention, sorted
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Replace the projection with one derived from `tree`
    pub fn rebuild(&self, tree: &AdapterTree) {
        let rebuilt = tree
            .iter()
            .filter(|node| node.model.status.is_dirty())
            .map(|node| {
                (
                    node.id,
                    DirtyTreeNode {
                        id: node.id,
                        parent_id: node.parent_id,
                        status: node.model.status.dirty_facets(),
                    },
                )
            })
            .collect();
        *self.nodes.write() = rebuilt;
    }
}

impl TreeObserver for DirtyTree {
    fn on_committed(&self, operation: &CommittedOperation) {
        let mut nodes = self.nodes.write();
        match operation.kind {
            OperationKind::Delete => {
                for id in &operation.removed_ids {
                    nodes.remove(id);
                }
            }
            OperationKind::Create | OperationKind::Update | OperationKind::Move => {
                if let Some(node) = &operation.new {
                    if node.model.status.is_dirty() {
                        nodes.insert(
                            node.id,
                            DirtyTreeNode {
                                id: node.id,
                                parent_id: node.parent_id,
                                status: node.model.status.dirty_facets(),
                            },
                        );
                    } else {
                        nodes.remove(&node.id);
                    }
                }
            }
        }
    }
}
