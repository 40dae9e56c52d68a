//! Node Link Store
//!
//! Persistent store of relationships between adapter tree nodes. A link is
//! addressable from both ends: at most one outgoing link per
//! `(link_type, source)` and one incoming link per `(link_type, destination)`.

pub mod persistence;

use crate::error::StorageError;
use crate::types::NodeId;
use serde::{Deserialize, Serialize};

pub use persistence::SledNodeLinkStore;

/// Link type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkType {
    /// Destination content originated from a local copy of the source
    Copy,
}

impl LinkType {
    pub const ALL: [LinkType; 1] = [LinkType::Copy];

    pub(crate) fn tag(self) -> u8 {
        match self {
            LinkType::Copy => 1,
        }
    }
}

/// NodeLink: directed relationship between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeLink {
    pub link_type: LinkType,
    pub source_id: NodeId,
    pub destination_id: NodeId,
}

impl NodeLink {
    pub fn copy(source_id: NodeId, destination_id: NodeId) -> Self {
        Self {
            link_type: LinkType::Copy,
            source_id,
            destination_id,
        }
    }

    pub fn touches(&self, node_id: NodeId) -> bool {
        self.source_id == node_id || self.destination_id == node_id
    }
}

/// NodeLink Store interface
pub trait NodeLinkStore: Send + Sync {
    /// Link leaving `source_id`, if any
    fn get_outgoing(
        &self,
        link_type: LinkType,
        source_id: NodeId,
    ) -> Result<Option<NodeLink>, StorageError>;

    /// Link arriving at `destination_id`, if any
    fn get_incoming(
        &self,
        link_type: LinkType,
        destination_id: NodeId,
    ) -> Result<Option<NodeLink>, StorageError>;

    /// Persist a link. Any link occupying the same outgoing or incoming slot is
    /// removed in the same transaction and returned.
    fn add(&self, link: &NodeLink) -> Result<Vec<NodeLink>, StorageError>;

    /// Remove a link; returns false when it was not stored
    fn delete(&self, link: &NodeLink) -> Result<bool, StorageError>;

    /// All links of any type
    fn list(&self) -> Result<Vec<NodeLink>, StorageError>;

    /// Links of any type with `node_id` at either end
    fn links_touching(&self, node_id: NodeId) -> Result<Vec<NodeLink>, StorageError> {
        let mut links = Vec::new();
        for link_type in LinkType::ALL {
            if let Some(link) = self.get_outgoing(link_type, node_id)? {
                links.push(link);
            }
            if let Some(link) = self.get_incoming(link_type, node_id)? {
                if !links.contains(&link) {
                    links.push(link);
                }
            }
        }
        Ok(links)
    }
}
