//! Sync root metadata. Supplied from outside; this crate only reads it.

use super::AdapterTree;
use crate::types::{AltId, NodeId, ScopeId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-mapping root metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRoot {
    pub id: ScopeId,
    pub is_enabled: bool,
    /// Alternate id of the top-level tree node the mapping is rooted at
    pub root_alt_id: AltId,
}

#[derive(Default)]
pub struct SyncRootRegistry {
    roots: RwLock<HashMap<ScopeId, SyncRoot>>,
}

impl SyncRootRegistry {
    pub fn new(roots: impl IntoIterator<Item = SyncRoot>) -> Self {
        Self {
            roots: RwLock::new(roots.into_iter().map(|r| (r.id, r)).collect()),
        }
    }

    /// Insert or replace a root, as reported by the settings owner
    pub fn set(&self, root: SyncRoot) {
        self.roots.write().insert(root.id, root);
    }

    pub fn get(&self, id: ScopeId) -> Option<SyncRoot> {
        self.roots.read().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<SyncRoot> {
        let mut roots: Vec<SyncRoot> = self.roots.read().values().cloned().collect();
        roots.sort_by_key(|r| r.id);
        roots
    }

    pub fn by_root_alt_id(&self, alt_id: &AltId) -> Option<SyncRoot> {
        self.roots
            .read()
            .values()
            .find(|r| r.root_alt_id == *alt_id)
            .cloned()
    }

    /// Root the node belongs to, resolved through its top-level ancestor
    pub fn sync_root_of(&self, tree: &AdapterTree, id: NodeId) -> Option<SyncRoot> {
        tree.sync_root_node(id)
            .and_then(|top| self.by_root_alt_id(&top.alt_id))
    }
}
