//! Core identity types shared by the adapter tree, link store and event pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// NodeId: stable internal identity, allocated and owned by the adapter tree
pub type NodeId = u64;

/// VolumeId: platform volume the alternate id is scoped to
pub type VolumeId = u32;

/// ScopeId: identifies one synchronized root mapping
pub type ScopeId = u32;

/// Id of the virtual root every sync root hangs under
pub const ROOT_NODE_ID: NodeId = 0;

/// AltId: platform compound id (volume + file id), the second identity space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AltId {
    pub volume_id: VolumeId,
    pub id: u64,
}

impl AltId {
    pub fn new(volume_id: VolumeId, id: u64) -> Self {
        Self { volume_id, id }
    }
}

impl fmt::Display for AltId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.volume_id, self.id)
    }
}
