//! Adapter tree node types and status facets

use crate::types::{AltId, NodeId};
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

bitflags! {
    /// Independent status facets of one node
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct NodeStatus: u32 {
        const DIRTY_ATTRIBUTES = 1 << 0;
        const DIRTY_CONTENT = 1 << 1;
        const DIRTY_PLACEHOLDER = 1 << 2;
        const DIRTY_DELETED = 1 << 3;
        const DIRTY_DESCENDANTS = 1 << 4;
        const DIRTY_COPIED_FROM = 1 << 5;
        const DIRTY_COPIED_TO = 1 << 6;
        const SYNCED = 1 << 7;

        const DIRTY = Self::DIRTY_ATTRIBUTES.bits()
            | Self::DIRTY_CONTENT.bits()
            | Self::DIRTY_PLACEHOLDER.bits()
            | Self::DIRTY_DELETED.bits()
            | Self::DIRTY_DESCENDANTS.bits()
            | Self::DIRTY_COPIED_FROM.bits()
            | Self::DIRTY_COPIED_TO.bits();
    }
}

impl NodeStatus {
    /// Node still needs reconciliation attention
    pub fn is_dirty(self) -> bool {
        self.intersects(NodeStatus::DIRTY)
    }

    pub fn is_deleted(self) -> bool {
        self.contains(NodeStatus::DIRTY_DELETED)
    }

    pub fn is_dirty_placeholder(self) -> bool {
        self.contains(NodeStatus::DIRTY_PLACEHOLDER)
    }

    pub fn is_synced(self) -> bool {
        self.contains(NodeStatus::SYNCED)
    }

    pub fn is_copy_source(self) -> bool {
        self.contains(NodeStatus::DIRTY_COPIED_FROM)
    }

    pub fn is_copy_destination(self) -> bool {
        self.contains(NodeStatus::DIRTY_COPIED_TO)
    }

    /// Only the dirty facets
    pub fn dirty_facets(self) -> NodeStatus {
        self & NodeStatus::DIRTY
    }
}

/// Node type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    File,
    Directory,
}

/// Mutable state of a node, replaced as a whole by Update operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeModel {
    pub status: NodeStatus,
    /// Bumped on every local content write; never decreases
    pub content_version: u64,
    pub size: u64,
    pub last_write_time: DateTime<Utc>,
}

impl NodeModel {
    pub fn new(size: u64, last_write_time: DateTime<Utc>) -> Self {
        Self {
            status: NodeStatus::empty(),
            content_version: 1,
            size,
            last_write_time,
        }
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_content_version(mut self, content_version: u64) -> Self {
        self.content_version = content_version;
        self
    }

    pub fn with_status_added(mut self, flags: NodeStatus) -> Self {
        self.status.insert(flags);
        self
    }

    pub fn with_status_removed(mut self, flags: NodeStatus) -> Self {
        self.status.remove(flags);
        self
    }
}

/// AdapterTreeNode: one tracked item bridging both identity spaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterTreeNode {
    pub id: NodeId,
    pub alt_id: AltId,
    pub node_type: NodeType,
    pub parent_id: NodeId,
    pub name: String,
    pub model: NodeModel,
}

impl AdapterTreeNode {
    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }

    pub fn is_directory(&self) -> bool {
        self.node_type == NodeType::Directory
    }
}
