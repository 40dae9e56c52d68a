//! Pre-commit hook that keeps copy links consistent with tree mutations.

use crate::error::TreeError;
use crate::store::{LinkType, NodeLink, NodeLinkStore};
use crate::tree::{HookContext, NodeStatus, Operation, OperationHook, OperationKind, PendingOperation};
use crate::types::NodeId;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Retires copy links when their destination is reconciled or when either end
/// is deleted, and strips copy flags that have no backing link.
///
/// Link store deletions only happen once the triggering operation has
/// committed, so a veto from a later hook leaves links and flags untouched.
pub struct CopyLinkRetirement {
    links: Arc<dyn NodeLinkStore>,
}

impl CopyLinkRetirement {
    pub fn new(links: Arc<dyn NodeLinkStore>) -> Self {
        Self { links }
    }

    fn delete_after_commit(&self, links: Vec<NodeLink>, ctx: &mut HookContext<'_>) {
        let store = Arc::clone(&self.links);
        ctx.after_commit(move || {
            for link in &links {
                store.delete(link)?;
            }
            Ok(())
        });
    }

    fn retire_incoming(
        &self,
        id: NodeId,
        ctx: &mut HookContext<'_>,
    ) -> Result<Option<NodeLink>, TreeError> {
        let Some(link) = self.links.get_incoming(LinkType::Copy, id)? else {
            return Ok(None);
        };
        self.delete_after_commit(vec![link], ctx);
        if ctx.tree().contains(link.source_id) {
            ctx.defer(Operation::ModifyStatus {
                id: link.source_id,
                insert: NodeStatus::empty(),
                remove: NodeStatus::DIRTY_COPIED_FROM,
            });
        }
        Ok(Some(link))
    }

    fn retire_outgoing(
        &self,
        id: NodeId,
        ctx: &mut HookContext<'_>,
    ) -> Result<Option<NodeLink>, TreeError> {
        let Some(link) = self.links.get_outgoing(LinkType::Copy, id)? else {
            return Ok(None);
        };
        self.delete_after_commit(vec![link], ctx);
        if ctx.tree().contains(link.destination_id) {
            ctx.defer(Operation::ModifyStatus {
                id: link.destination_id,
                insert: NodeStatus::empty(),
                remove: NodeStatus::DIRTY_COPIED_TO,
            });
        }
        Ok(Some(link))
    }

    fn on_model_change(
        &self,
        pending: PendingOperation,
        ctx: &mut HookContext<'_>,
    ) -> Result<PendingOperation, TreeError> {
        let Some(mut model) = pending.new_model().cloned() else {
            return Ok(pending);
        };
        let id = pending.id();
        let old_status = pending
            .old_model()
            .map(|m| m.status)
            .unwrap_or_else(NodeStatus::empty);

        if model.status.is_copy_destination() {
            if model.status.is_synced() {
                if let Some(link) = self.retire_incoming(id, ctx)? {
                    info!(
                        source_id = link.source_id,
                        destination_id = id,
                        "Retired copy link of synced destination"
                    );
                }
                model.status.remove(NodeStatus::DIRTY_COPIED_TO);
            } else if self.links.get_incoming(LinkType::Copy, id)?.is_none() {
                warn!(node_id = id, "Cleared copy destination flag without link");
                model.status.remove(NodeStatus::DIRTY_COPIED_TO);
            }
        } else if old_status.is_copy_destination() {
            if let Some(link) = self.retire_incoming(id, ctx)? {
                debug!(
                    source_id = link.source_id,
                    destination_id = id,
                    "Retired copy link after destination flag was cleared"
                );
            }
        }

        if model.status.is_copy_source() {
            if self.links.get_outgoing(LinkType::Copy, id)?.is_none() {
                warn!(node_id = id, "Cleared copy source flag without link");
                model.status.remove(NodeStatus::DIRTY_COPIED_FROM);
            }
        } else if old_status.is_copy_source() {
            if let Some(link) = self.retire_outgoing(id, ctx)? {
                debug!(
                    source_id = id,
                    destination_id = link.destination_id,
                    "Retired copy link after source flag was cleared"
                );
            }
        }

        Ok(pending.with_model(model))
    }

    fn on_subtree_delete(
        &self,
        pending: PendingOperation,
        ctx: &mut HookContext<'_>,
    ) -> Result<PendingOperation, TreeError> {
        let removed: HashSet<NodeId> = pending.removed_ids.iter().copied().collect();
        let mut seen = HashSet::new();
        let mut retired: Vec<NodeLink> = Vec::new();
        for id in &pending.removed_ids {
            for link in self.links.links_touching(*id)? {
                if seen.insert(link) {
                    retired.push(link);
                }
            }
        }

        for link in &retired {
            if !removed.contains(&link.source_id) && ctx.tree().contains(link.source_id) {
                ctx.defer(Operation::ModifyStatus {
                    id: link.source_id,
                    insert: NodeStatus::empty(),
                    remove: NodeStatus::DIRTY_COPIED_FROM,
                });
            }
            if !removed.contains(&link.destination_id) && ctx.tree().contains(link.destination_id)
            {
                ctx.defer(Operation::ModifyStatus {
                    id: link.destination_id,
                    insert: NodeStatus::empty(),
                    remove: NodeStatus::DIRTY_COPIED_TO,
                });
            }
        }

        if !retired.is_empty() {
            info!(
                node_id = pending.id(),
                removed_nodes = removed.len(),
                retired_links = retired.len(),
                "Retiring copy links of deleted subtree"
            );
            self.delete_after_commit(retired, ctx);
        }
        Ok(pending)
    }
}

impl OperationHook for CopyLinkRetirement {
    fn on_executing(
        &self,
        pending: PendingOperation,
        ctx: &mut HookContext<'_>,
    ) -> Result<PendingOperation, TreeError> {
        match pending.kind {
            OperationKind::Delete => self.on_subtree_delete(pending, ctx),
            OperationKind::Create | OperationKind::Update | OperationKind::Move => {
                self.on_model_change(pending, ctx)
            }
        }
    }
}
