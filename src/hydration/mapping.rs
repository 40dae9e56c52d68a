//! Collaborators the hydration handler consults outside the adapter tree.

use crate::types::NodeId;

/// Remote identity a local node maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedNode {
    pub node_id: NodeId,
    /// Content version of the remote node the local placeholder reflects
    pub content_version: u64,
}

pub trait IdentityMapping: Send + Sync {
    fn get_mapped_node_id_or_default(&self, id: NodeId) -> Option<MappedNode>;
}

/// Repairs a local size that no longer agrees with the bytes actually written
pub trait SizeCorrection: Send + Sync {
    fn schedule(&self, id: NodeId, expected_size: u64, actual_size: u64);
}
