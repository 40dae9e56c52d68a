//! Tree operations and the pre-commit hook chain.
//!
//! Every mutation of the adapter tree is an [`Operation`]. Before it commits,
//! the tree turns it into a [`PendingOperation`] carrying both the old and the
//! intended node and threads it by value through each registered
//! [`OperationHook`]. A hook returns the pending operation unchanged, returns
//! it with a rewritten model, or vetoes the commit with an error. Hooks may
//! defer follow-up operations; those run after the commit inside the same
//! locked transaction and pass through the hooks themselves. Side effects
//! outside the tree (link store writes) are registered with
//! [`HookContext::after_commit`] so a veto from a later hook leaves them
//! undone.

use super::node::{AdapterTreeNode, NodeModel, NodeStatus};
use super::AdapterTree;
use crate::error::TreeError;
use crate::types::NodeId;

/// A requested tree mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Insert a node; the id must be unused (see [`AdapterTree::allocate_id`])
    Create(AdapterTreeNode),
    /// Replace the model of an existing node
    Update { id: NodeId, model: NodeModel },
    /// Set and clear status facets relative to the node's model at commit time
    ModifyStatus {
        id: NodeId,
        insert: NodeStatus,
        remove: NodeStatus,
    },
    /// Re-parent and/or rename a node
    Move {
        id: NodeId,
        parent_id: NodeId,
        name: String,
    },
    /// Remove a node and its whole subtree
    Delete { id: NodeId },
}

impl Operation {
    pub fn node_id(&self) -> NodeId {
        match self {
            Operation::Create(node) => node.id,
            Operation::Update { id, .. }
            | Operation::ModifyStatus { id, .. }
            | Operation::Move { id, .. }
            | Operation::Delete { id } => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Update,
    Move,
    Delete,
}

/// Operation about to commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub kind: OperationKind,
    /// Node before the operation; `None` for Create
    pub old: Option<AdapterTreeNode>,
    /// Intended node after the operation; `None` for Delete
    pub new: Option<AdapterTreeNode>,
    /// Delete only: the subtree root followed by every descendant
    pub removed_ids: Vec<NodeId>,
}

impl PendingOperation {
    pub fn id(&self) -> NodeId {
        self.new
            .as_ref()
            .or(self.old.as_ref())
            .map(|n| n.id)
            .unwrap_or_default()
    }

    /// Intended model, if the node survives the operation
    pub fn new_model(&self) -> Option<&NodeModel> {
        self.new.as_ref().map(|n| &n.model)
    }

    pub fn old_model(&self) -> Option<&NodeModel> {
        self.old.as_ref().map(|n| &n.model)
    }

    /// Replace the intended model; no effect on Delete
    pub fn with_model(mut self, model: NodeModel) -> Self {
        if let Some(node) = self.new.as_mut() {
            node.model = model;
        }
        self
    }
}

/// Operation as it was committed, handed to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedOperation {
    pub kind: OperationKind,
    pub old: Option<AdapterTreeNode>,
    pub new: Option<AdapterTreeNode>,
    pub removed_ids: Vec<NodeId>,
}

impl From<PendingOperation> for CommittedOperation {
    fn from(pending: PendingOperation) -> Self {
        Self {
            kind: pending.kind,
            old: pending.old,
            new: pending.new,
            removed_ids: pending.removed_ids,
        }
    }
}

/// Side effect that runs once the pending operation has committed
pub type CommitAction = Box<dyn FnOnce() -> Result<(), TreeError>>;

/// Read access to the tree plus queues of follow-up work
pub struct HookContext<'a> {
    tree: &'a AdapterTree,
    deferred: Vec<Operation>,
    after_commit: Vec<CommitAction>,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(tree: &'a AdapterTree) -> Self {
        Self {
            tree,
            deferred: Vec::new(),
            after_commit: Vec::new(),
        }
    }

    /// Tree state before the pending operation commits
    pub fn tree(&self) -> &AdapterTree {
        self.tree
    }

    /// Run `operation` after the pending one commits
    pub fn defer(&mut self, operation: Operation) {
        self.deferred.push(operation);
    }

    /// Run `action` after the pending operation commits and before any
    /// deferred operation. Dropped if any hook vetoes.
    pub fn after_commit(&mut self, action: impl FnOnce() -> Result<(), TreeError> + 'static) {
        self.after_commit.push(Box::new(action));
    }

    pub(crate) fn into_parts(self) -> (Vec<Operation>, Vec<CommitAction>) {
        (self.deferred, self.after_commit)
    }
}

/// Synchronous pre-commit middleware
pub trait OperationHook: Send + Sync {
    fn on_executing(
        &self,
        pending: PendingOperation,
        ctx: &mut HookContext<'_>,
    ) -> Result<PendingOperation, TreeError>;
}

/// Post-commit listener; runs under the tree lock
pub trait TreeObserver: Send + Sync {
    fn on_committed(&self, operation: &CommittedOperation);
}
