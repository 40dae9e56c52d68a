//! Copied-Node Handler
//!
//! Tracks local copies so that copied content can be cloned remotely instead of
//! re-uploaded. A copy link `source -> destination` exists exactly while the
//! destination carries `DIRTY_COPIED_TO` and the source `DIRTY_COPIED_FROM`.
//! Links are created through [`CopiedNodeHandler::add`] and retired by the
//! [`CopyLinkRetirement`] hook the handler installs on the adapter tree.

mod retirement;

pub use retirement::CopyLinkRetirement;

use crate::error::AdapterError;
use crate::store::{LinkType, NodeLink, NodeLinkStore};
use crate::tree::{AdapterTree, DirtyTree, NodeStatus, Operation, SharedAdapterTree};
use crate::types::NodeId;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub struct CopiedNodeHandler {
    tree: SharedAdapterTree,
    links: Arc<dyn NodeLinkStore>,
    dirty_tree: Arc<DirtyTree>,
}

impl CopiedNodeHandler {
    /// Create the handler and install its retirement hook on `tree`
    pub fn new(
        tree: SharedAdapterTree,
        links: Arc<dyn NodeLinkStore>,
        dirty_tree: Arc<DirtyTree>,
    ) -> Self {
        tree.lock()
            .add_hook(Arc::new(CopyLinkRetirement::new(Arc::clone(&links))));
        Self {
            tree,
            links,
            dirty_tree,
        }
    }

    /// Record that `destination_id` was created as a local copy of `source_id`.
    ///
    /// Returns `Ok(false)` when the destination is already synced. When the
    /// source is itself a copy destination, the link is re-targeted to the
    /// original source and the intermediate link is removed.
    pub fn add(&self, source_id: NodeId, destination_id: NodeId) -> Result<bool, AdapterError> {
        let mut tree = self.tree.lock();

        let destination = tree
            .get(destination_id)
            .ok_or(AdapterError::NodeNotFound(destination_id))?;
        if !destination.is_file() {
            return Err(AdapterError::NotAFile(destination_id));
        }
        if destination.model.status.is_synced() {
            debug!(
                source_id,
                destination_id, "Rejected copy link: destination already synced"
            );
            return Ok(false);
        }
        let source = tree
            .get(source_id)
            .ok_or(AdapterError::NodeNotFound(source_id))?;
        if !source.is_file() {
            return Err(AdapterError::NotAFile(source_id));
        }

        let (resolved_source, intermediate) = self.resolve_original_source(source_id, destination_id)?;

        if let Some(intermediate) = intermediate {
            self.links.delete(&intermediate)?;
            clear_status(&mut tree, intermediate.destination_id, NodeStatus::DIRTY_COPIED_TO)?;
            if intermediate.source_id != resolved_source {
                clear_status(&mut tree, intermediate.source_id, NodeStatus::DIRTY_COPIED_FROM)?;
            }
            debug!(
                original_source_id = resolved_source,
                intermediate_id = source_id,
                "Re-targeted copy of a copy to the original source"
            );
        }

        // The destination must not stay a copy source itself, or chains would grow past depth 1
        if let Some(onward) = self.links.get_outgoing(LinkType::Copy, destination_id)? {
            self.links.delete(&onward)?;
            clear_status(&mut tree, onward.destination_id, NodeStatus::DIRTY_COPIED_TO)?;
            clear_status(&mut tree, destination_id, NodeStatus::DIRTY_COPIED_FROM)?;
        }

        let link = NodeLink::copy(resolved_source, destination_id);
        let displaced = self.links.add(&link)?;
        for old in &displaced {
            if old.source_id != resolved_source {
                clear_status(&mut tree, old.source_id, NodeStatus::DIRTY_COPIED_FROM)?;
            }
            if old.destination_id != destination_id {
                clear_status(&mut tree, old.destination_id, NodeStatus::DIRTY_COPIED_TO)?;
            }
        }

        let flagged = tree
            .execute(Operation::ModifyStatus {
                id: resolved_source,
                insert: NodeStatus::DIRTY_COPIED_FROM,
                remove: NodeStatus::empty(),
            })
            .and_then(|_| {
                tree.execute(Operation::ModifyStatus {
                    id: destination_id,
                    insert: NodeStatus::DIRTY_COPIED_TO,
                    remove: NodeStatus::SYNCED,
                })
            });
        if let Err(e) = flagged {
            self.links.delete(&link)?;
            return Err(e.into());
        }

        info!(
            source_id = resolved_source,
            destination_id,
            displaced = displaced.len(),
            "Added copy link"
        );
        Ok(true)
    }

    /// Copy source of `destination_id` while its dirty projection still
    /// carries `DIRTY_COPIED_TO`
    pub fn get_source_node_or_default(
        &self,
        destination_id: NodeId,
    ) -> Result<Option<NodeId>, AdapterError> {
        let _tree = self.tree.lock();
        match self.dirty_tree.get(destination_id) {
            Some(node) if node.status.is_copy_destination() => Ok(self
                .links
                .get_incoming(LinkType::Copy, destination_id)?
                .map(|link| link.source_id)),
            _ => Ok(None),
        }
    }

    /// All stored links
    pub fn links(&self) -> Result<Vec<NodeLink>, AdapterError> {
        Ok(self.links.list()?)
    }

    /// Walk incoming copy links from `source_id` to the original source.
    /// Returns the original source and the link into `source_id`, if any.
    fn resolve_original_source(
        &self,
        source_id: NodeId,
        destination_id: NodeId,
    ) -> Result<(NodeId, Option<NodeLink>), AdapterError> {
        let cycle = AdapterError::CopyCycle {
            source_id,
            destination_id,
        };
        if source_id == destination_id {
            return Err(cycle);
        }

        let intermediate = self.links.get_incoming(LinkType::Copy, source_id)?;
        let mut resolved = source_id;
        let mut visited = HashSet::from([source_id, destination_id]);
        let mut next = intermediate;
        while let Some(link) = next {
            if !visited.insert(link.source_id) {
                return Err(cycle);
            }
            resolved = link.source_id;
            next = self.links.get_incoming(LinkType::Copy, resolved)?;
        }
        Ok((resolved, intermediate))
    }
}

fn clear_status(tree: &mut AdapterTree, id: NodeId, flags: NodeStatus) -> Result<(), AdapterError> {
    if !tree.contains(id) {
        return Ok(());
    }
    tree.execute(Operation::ModifyStatus {
        id,
        insert: NodeStatus::empty(),
        remove: flags,
    })?;
    Ok(())
}
