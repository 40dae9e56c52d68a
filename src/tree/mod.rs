//! Adapter Tree
//!
//! Canonical tree of synchronized items. The tree owns the node map keyed by
//! internal id; the alternate-id index and the child sets are derived and are
//! updated in the same transaction as the node map. Mutation goes only through
//! [`AdapterTree::execute`].
//!
//! Access from more than one thread goes through [`SharedAdapterTree`], whose
//! single mutex is held for one synchronous tree operation at a time. Hooks and
//! observers run while that lock is held and must not block on I/O.

pub mod dirty;
pub mod node;
pub mod operation;
pub mod sync_root;

pub use dirty::{DirtyTree, DirtyTreeNode};
pub use node::{AdapterTreeNode, NodeModel, NodeStatus, NodeType};
pub use operation::{
    CommitAction, CommittedOperation, HookContext, Operation, OperationHook, OperationKind,
    PendingOperation, TreeObserver,
};
pub use sync_root::{SyncRoot, SyncRootRegistry};

use crate::error::TreeError;
use crate::types::{AltId, NodeId, ROOT_NODE_ID};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Adapter tree
pub struct AdapterTree {
    nodes: HashMap<NodeId, AdapterTreeNode>,
    alt_index: HashMap<AltId, NodeId>,
    children: HashMap<NodeId, BTreeSet<NodeId>>,
    next_id: NodeId,
    hooks: Vec<Arc<dyn OperationHook>>,
    observers: Vec<Arc<dyn TreeObserver>>,
}

impl Default for AdapterTree {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterTree {
    pub fn new() -> Self {
        AdapterTree {
            nodes: HashMap::new(),
            alt_index: HashMap::new(),
            children: HashMap::new(),
            next_id: ROOT_NODE_ID + 1,
            hooks: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Append a pre-commit hook; hooks run in registration order
    pub fn add_hook(&mut self, hook: Arc<dyn OperationHook>) {
        self.hooks.push(hook);
    }

    pub fn add_observer(&mut self, observer: Arc<dyn TreeObserver>) {
        self.observers.push(observer);
    }

    /// Reserve a fresh internal id
    pub fn allocate_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&AdapterTreeNode> {
        self.nodes.get(&id)
    }

    pub fn get_by_alt_id(&self, alt_id: &AltId) -> Option<&AdapterTreeNode> {
        self.alt_index.get(alt_id).and_then(|id| self.nodes.get(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AdapterTreeNode> {
        self.nodes.values()
    }

    /// Direct children, ordered by id
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &AdapterTreeNode> {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.nodes.get(child))
    }

    /// Parent chain from the direct parent up to the top-level node
    pub fn ancestors(&self, id: NodeId) -> Vec<&AdapterTreeNode> {
        let mut ancestors = Vec::new();
        let mut current = self.nodes.get(&id).map(|n| n.parent_id);
        while let Some(parent_id) = current {
            match self.nodes.get(&parent_id) {
                Some(parent) => {
                    ancestors.push(parent);
                    current = Some(parent.parent_id);
                }
                None => break,
            }
        }
        ancestors
    }

    /// `id` followed by all its descendants (pre-order)
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        if !self.nodes.contains_key(&id) {
            return Vec::new();
        }
        let mut collected = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            collected.push(current);
            if let Some(children) = self.children.get(&current) {
                stack.extend(children.iter().rev().copied());
            }
        }
        collected
    }

    /// Top-level node (direct child of the virtual root) the node lives under
    pub fn sync_root_node(&self, id: NodeId) -> Option<&AdapterTreeNode> {
        let node = self.nodes.get(&id)?;
        if node.parent_id == ROOT_NODE_ID {
            return Some(node);
        }
        self.ancestors(id).pop()
    }

    /// True when the node or any ancestor carries `DIRTY_DELETED`
    pub fn is_branch_deleted(&self, id: NodeId) -> bool {
        match self.nodes.get(&id) {
            Some(node) => {
                node.model.status.is_deleted()
                    || self
                        .ancestors(id)
                        .iter()
                        .any(|a| a.model.status.is_deleted())
            }
            None => false,
        }
    }

    /// Allocate an id and create a node with it
    pub fn create(
        &mut self,
        alt_id: AltId,
        node_type: NodeType,
        parent_id: NodeId,
        name: impl Into<String>,
        model: NodeModel,
    ) -> Result<NodeId, TreeError> {
        let id = self.allocate_id();
        self.execute(Operation::Create(AdapterTreeNode {
            id,
            alt_id,
            node_type,
            parent_id,
            name: name.into(),
            model,
        }))?;
        Ok(id)
    }

    /// Replace a node's model
    pub fn update(&mut self, id: NodeId, model: NodeModel) -> Result<(), TreeError> {
        self.execute(Operation::Update { id, model })
    }

    pub fn delete(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.execute(Operation::Delete { id })
    }

    /// Execute an operation and every operation deferred by its hooks.
    ///
    /// A hook error on the requested operation aborts it with nothing
    /// committed. Deferred operations whose target no longer exists are
    /// dropped; other deferred failures are logged.
    pub fn execute(&mut self, operation: Operation) -> Result<(), TreeError> {
        let mut queue = VecDeque::new();
        let mut primary = Some(operation);

        loop {
            let (operation, is_primary) = match primary.take() {
                Some(op) => (op, true),
                None => match queue.pop_front() {
                    Some(op) => (op, false),
                    None => break,
                },
            };

            match self.execute_one(operation.clone()) {
                Ok(deferred) => queue.extend(deferred),
                Err(e) if is_primary => return Err(e),
                Err(TreeError::NodeNotFound(id)) => {
                    debug!(node_id = id, "Dropped deferred operation on removed node");
                }
                Err(e) => {
                    warn!(
                        node_id = operation.node_id(),
                        error = %e,
                        "Deferred tree operation failed"
                    );
                }
            }
        }

        Ok(())
    }

    fn execute_one(&mut self, operation: Operation) -> Result<Vec<Operation>, TreeError> {
        let pending = self.prepare(operation)?;
        let id = pending.id();
        let before = pending.new.clone();

        let mut ctx = HookContext::new(self);
        let mut pending = pending;
        for hook in &self.hooks {
            pending = hook.on_executing(pending, &mut ctx)?;
        }
        let (deferred, after_commit) = ctx.into_parts();

        if let (Some(before), Some(after)) = (&before, &pending.new) {
            if before.id != after.id
                || before.alt_id != after.alt_id
                || before.node_type != after.node_type
                || before.parent_id != after.parent_id
            {
                return Err(TreeError::Vetoed(id, "hook changed node identity".to_string()));
            }
        }
        if before.is_some() != pending.new.is_some() {
            return Err(TreeError::Vetoed(id, "hook changed operation kind".to_string()));
        }

        let committed = self.commit(pending);
        for action in after_commit {
            if let Err(e) = action() {
                warn!(node_id = id, error = %e, "Post-commit action failed");
            }
        }
        for observer in &self.observers {
            observer.on_committed(&committed);
        }
        Ok(deferred)
    }

    fn validate_parent(&self, parent_id: NodeId) -> Result<(), TreeError> {
        if parent_id == ROOT_NODE_ID {
            return Ok(());
        }
        match self.nodes.get(&parent_id) {
            Some(parent) if parent.is_directory() => Ok(()),
            Some(_) => Err(TreeError::ParentNotDirectory(parent_id)),
            None => Err(TreeError::NodeNotFound(parent_id)),
        }
    }

    fn existing(&self, id: NodeId) -> Result<&AdapterTreeNode, TreeError> {
        self.nodes.get(&id).ok_or(TreeError::NodeNotFound(id))
    }

    fn prepare(&self, operation: Operation) -> Result<PendingOperation, TreeError> {
        match operation {
            Operation::Create(node) => {
                if node.id == ROOT_NODE_ID || self.nodes.contains_key(&node.id) {
                    return Err(TreeError::NodeExists(node.id));
                }
                if let Some(owner) = self.alt_index.get(&node.alt_id) {
                    return Err(TreeError::AltIdInUse(node.alt_id, *owner));
                }
                self.validate_parent(node.parent_id)?;
                Ok(PendingOperation {
                    kind: OperationKind::Create,
                    old: None,
                    new: Some(node),
                    removed_ids: Vec::new(),
                })
            }
            Operation::Update { id, model } => {
                let old = self.existing(id)?;
                if model.content_version < old.model.content_version {
                    return Err(TreeError::ContentVersionDecreased {
                        id,
                        current: old.model.content_version,
                        requested: model.content_version,
                    });
                }
                let mut new = old.clone();
                new.model = model;
                Ok(PendingOperation {
                    kind: OperationKind::Update,
                    old: Some(old.clone()),
                    new: Some(new),
                    removed_ids: Vec::new(),
                })
            }
            Operation::ModifyStatus { id, insert, remove } => {
                let old = self.existing(id)?;
                let mut new = old.clone();
                new.model.status.remove(remove);
                new.model.status.insert(insert);
                Ok(PendingOperation {
                    kind: OperationKind::Update,
                    old: Some(old.clone()),
                    new: Some(new),
                    removed_ids: Vec::new(),
                })
            }
            Operation::Move {
                id,
                parent_id,
                name,
            } => {
                let old = self.existing(id)?;
                self.validate_parent(parent_id)?;
                if self.subtree(id).contains(&parent_id) {
                    return Err(TreeError::MoveCycle(id, parent_id));
                }
                let mut new = old.clone();
                new.parent_id = parent_id;
                new.name = name;
                Ok(PendingOperation {
                    kind: OperationKind::Move,
                    old: Some(old.clone()),
                    new: Some(new),
                    removed_ids: Vec::new(),
                })
            }
            Operation::Delete { id } => {
                let old = self.existing(id)?;
                Ok(PendingOperation {
                    kind: OperationKind::Delete,
                    old: Some(old.clone()),
                    new: None,
                    removed_ids: self.subtree(id),
                })
            }
        }
    }

    fn commit(&mut self, pending: PendingOperation) -> CommittedOperation {
        match pending.kind {
            OperationKind::Create => {
                if let Some(node) = &pending.new {
                    self.alt_index.insert(node.alt_id, node.id);
                    self.children
                        .entry(node.parent_id)
                        .or_default()
                        .insert(node.id);
                    self.nodes.insert(node.id, node.clone());
                }
            }
            OperationKind::Update => {
                if let Some(node) = &pending.new {
                    self.nodes.insert(node.id, node.clone());
                }
            }
            OperationKind::Move => {
                if let (Some(old), Some(node)) = (&pending.old, &pending.new) {
                    if let Some(siblings) = self.children.get_mut(&old.parent_id) {
                        siblings.remove(&node.id);
                    }
                    self.children
                        .entry(node.parent_id)
                        .or_default()
                        .insert(node.id);
                    self.nodes.insert(node.id, node.clone());
                }
            }
            OperationKind::Delete => {
                if let Some(root) = &pending.old {
                    if let Some(siblings) = self.children.get_mut(&root.parent_id) {
                        siblings.remove(&root.id);
                    }
                }
                for id in &pending.removed_ids {
                    if let Some(node) = self.nodes.remove(id) {
                        self.alt_index.remove(&node.alt_id);
                    }
                    self.children.remove(id);
                }
            }
        }
        CommittedOperation::from(pending)
    }
}

/// Adapter tree behind its serialization lock
#[derive(Clone)]
pub struct SharedAdapterTree {
    inner: Arc<Mutex<AdapterTree>>,
}

impl SharedAdapterTree {
    pub fn new(tree: AdapterTree) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tree)),
        }
    }

    /// Exclusive access for one synchronous tree operation. Do not hold the
    /// guard across an await point.
    pub fn lock(&self) -> MutexGuard<'_, AdapterTree> {
        self.inner.lock()
    }
}
