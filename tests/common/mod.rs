//! Shared fixtures and fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cloudfs_adapter::copy::CopiedNodeHandler;
use cloudfs_adapter::error::{
    EventLogError, FileSystemError, FileSystemErrorCode, HydrationError, RevisionError,
};
use cloudfs_adapter::events::{
    EventHandler, EventLogBatch, EventLogClient, Subscribers, Subscription,
};
use cloudfs_adapter::hydration::{
    IdentityMapping, MappedNode, SizeCorrection, SyncActivityItem, SyncActivitySink,
};
use cloudfs_adapter::revision::{
    FileReadStream, FileRevision, FileRevisionProvider, FileSystemClient, NodeInfo,
};
use cloudfs_adapter::store::{NodeLinkStore, SledNodeLinkStore};
use cloudfs_adapter::tree::{
    AdapterTree, DirtyTree, NodeModel, NodeStatus, NodeType, SharedAdapterTree, SyncRoot,
    SyncRootRegistry,
};
use cloudfs_adapter::types::{AltId, NodeId, ROOT_NODE_ID};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Cursor;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const VOLUME: u32 = 1;
pub const TOP_ALT: u64 = 1000;

/// Last write time old enough to pass any settle delay used in tests
pub fn settled_time() -> DateTime<Utc> {
    Utc::now() - Duration::seconds(120)
}

/// Adapter tree with a single sync root directory, a dirty tree projection,
/// a temporary sled link store and the copied-node handler wired in.
pub struct Harness {
    pub tree: SharedAdapterTree,
    pub dirty: Arc<DirtyTree>,
    pub links: Arc<SledNodeLinkStore>,
    pub handler: CopiedNodeHandler,
    pub roots: Arc<SyncRootRegistry>,
    pub top: NodeId,
    next_alt: Mutex<u64>,
}

impl Harness {
    pub fn new() -> Self {
        let dirty = Arc::new(DirtyTree::new());
        let mut tree = AdapterTree::new();
        tree.add_observer(dirty.clone());
        let top = tree
            .create(
                AltId::new(VOLUME, TOP_ALT),
                NodeType::Directory,
                ROOT_NODE_ID,
                "root",
                NodeModel::new(0, settled_time()).with_status(NodeStatus::SYNCED),
            )
            .unwrap();

        let tree = SharedAdapterTree::new(tree);
        let links = Arc::new(SledNodeLinkStore::temporary().unwrap());
        let handler = CopiedNodeHandler::new(
            tree.clone(),
            links.clone() as Arc<dyn NodeLinkStore>,
            dirty.clone(),
        );
        let roots = Arc::new(SyncRootRegistry::new([SyncRoot {
            id: 1,
            is_enabled: true,
            root_alt_id: AltId::new(VOLUME, TOP_ALT),
        }]));

        Self {
            tree,
            dirty,
            links,
            handler,
            roots,
            top,
            next_alt: Mutex::new(TOP_ALT + 1),
        }
    }

    fn next_alt_id(&self) -> AltId {
        let mut next = self.next_alt.lock();
        let alt = AltId::new(VOLUME, *next);
        *next += 1;
        alt
    }

    pub fn add_dir(&self, parent: NodeId, name: &str) -> NodeId {
        let alt = self.next_alt_id();
        self.tree
            .lock()
            .create(
                alt,
                NodeType::Directory,
                parent,
                name,
                NodeModel::new(0, settled_time()),
            )
            .unwrap()
    }

    pub fn add_file(&self, parent: NodeId, name: &str, size: u64, content_version: u64) -> NodeId {
        let alt = self.next_alt_id();
        self.tree
            .lock()
            .create(
                alt,
                NodeType::File,
                parent,
                name,
                NodeModel::new(size, settled_time())
                    .with_content_version(content_version)
                    .with_status(NodeStatus::DIRTY_CONTENT),
            )
            .unwrap()
    }

    pub fn status(&self, id: NodeId) -> NodeStatus {
        self.tree.lock().get(id).unwrap().model.status
    }

    pub fn model(&self, id: NodeId) -> NodeModel {
        self.tree.lock().get(id).unwrap().model.clone()
    }

    pub fn alt_id(&self, id: NodeId) -> AltId {
        self.tree.lock().get(id).unwrap().alt_id
    }
}

/// Client serving fixed content per alternate id
#[derive(Default)]
pub struct StaticFileSystemClient {
    pub files: Mutex<HashMap<AltId, Vec<u8>>>,
    pub opens: AtomicUsize,
}

#[async_trait]
impl FileSystemClient for StaticFileSystemClient {
    async fn create_directory(&self, info: &NodeInfo) -> Result<AltId, FileSystemError> {
        Ok(info.alt_id)
    }

    async fn open_file_for_reading(
        &self,
        info: &NodeInfo,
        _cancel: CancellationToken,
    ) -> Result<FileReadStream, FileSystemError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.files.lock().get(&info.alt_id) {
            Some(content) => Ok(Box::new(Cursor::new(content.clone()))),
            None => Err(FileSystemError::new(
                FileSystemErrorCode::ObjectNotFound,
                "no content",
            )),
        }
    }
}

/// Revision provider over in-memory content, counting opens
#[derive(Default)]
pub struct FakeRevisionProvider {
    pub content: Mutex<HashMap<NodeId, Vec<u8>>>,
    pub fail_with: Mutex<Option<FileSystemErrorCode>>,
    pub opens: AtomicUsize,
    /// Token of the most recently opened revision
    pub last_token: Mutex<Option<CancellationToken>>,
    /// Streams served instead of `content`, consumed on open
    pub streams: Mutex<HashMap<NodeId, (u64, FileReadStream)>>,
}

impl FakeRevisionProvider {
    pub fn with_content(id: NodeId, content: &[u8]) -> Arc<Self> {
        let provider = Self::default();
        provider.content.lock().insert(id, content.to_vec());
        Arc::new(provider)
    }
}

#[async_trait]
impl FileRevisionProvider for FakeRevisionProvider {
    async fn open_file_for_reading(
        &self,
        id: NodeId,
        expected_content_version: u64,
        cancel: CancellationToken,
    ) -> Result<FileRevision, RevisionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(code) = *self.fail_with.lock() {
            return Err(FileSystemError::new(code, "injected").into());
        }
        let (size, stream): (u64, FileReadStream) = match self.streams.lock().remove(&id) {
            Some(stream) => stream,
            None => {
                let content = self
                    .content
                    .lock()
                    .get(&id)
                    .cloned()
                    .ok_or(RevisionError::NodeNotFound(id))?;
                (content.len() as u64, Box::new(Cursor::new(content)))
            }
        };
        let token = cancel.child_token();
        *self.last_token.lock() = Some(token.clone());
        let snapshot = NodeInfo {
            id,
            alt_id: AltId::new(2, id),
            parent_id: ROOT_NODE_ID,
            node_type: NodeType::File,
            path: format!("remote-{}", id).into(),
            size,
            last_write_time: settled_time(),
            content_version: expected_content_version,
        };
        Ok(FileRevision::new(snapshot, token, stream))
    }
}

/// Identity mapping backed by a map
#[derive(Default)]
pub struct MapIdentityMapping(pub Mutex<HashMap<NodeId, MappedNode>>);

impl IdentityMapping for MapIdentityMapping {
    fn get_mapped_node_id_or_default(&self, id: NodeId) -> Option<MappedNode> {
        self.0.lock().get(&id).copied()
    }
}

#[derive(Default)]
pub struct RecordingSizeCorrection(pub Mutex<Vec<(NodeId, u64, u64)>>);

impl SizeCorrection for RecordingSizeCorrection {
    fn schedule(&self, id: NodeId, expected_size: u64, actual_size: u64) {
        self.0.lock().push((id, expected_size, actual_size));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityCall {
    Progress(u64),
    Changed(SyncActivityItem),
    Warning(FileSystemErrorCode),
    Cancelled(Option<FileSystemErrorCode>),
    Failed(FileSystemErrorCode),
}

#[derive(Default)]
pub struct RecordingActivitySink(pub Mutex<Vec<ActivityCall>>);

impl RecordingActivitySink {
    pub fn calls(&self) -> Vec<ActivityCall> {
        self.0.lock().clone()
    }

    /// Terminal calls only
    pub fn terminal(&self) -> Vec<ActivityCall> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                ActivityCall::Progress(_) => false,
                ActivityCall::Changed(item) => item.status.is_terminal(),
                _ => true,
            })
            .collect()
    }
}

impl SyncActivitySink for RecordingActivitySink {
    fn on_progress(&self, item: &SyncActivityItem) {
        self.0.lock().push(ActivityCall::Progress(item.progress));
    }

    fn on_changed(&self, item: &SyncActivityItem) {
        self.0.lock().push(ActivityCall::Changed(item.clone()));
    }

    fn on_warning(&self, _item: &SyncActivityItem, error: &HydrationError) {
        self.0.lock().push(ActivityCall::Warning(error.code()));
    }

    fn on_cancelled(&self, item: &SyncActivityItem) {
        self.0.lock().push(ActivityCall::Cancelled(item.error_code));
    }

    fn on_failed(&self, _item: &SyncActivityItem, error: &HydrationError) {
        self.0.lock().push(ActivityCall::Failed(error.code()));
    }
}

/// Event source driven by the test
pub struct ScriptedEventSource {
    subscribers: Arc<Subscribers>,
    pub pulls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
    pub enabled: AtomicUsize,
    /// Pending batches published on the next pull
    pub queued: Mutex<Vec<EventLogBatch>>,
    /// Delay inside each pull, to let callers overlap
    pub pull_delay: std::time::Duration,
}

impl ScriptedEventSource {
    pub fn new(pull_delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            subscribers: Subscribers::new(),
            pulls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            enabled: AtomicUsize::new(0),
            queued: Mutex::new(Vec::new()),
            pull_delay,
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn publish(&self, batch: EventLogBatch) {
        self.subscribers.publish(batch);
    }
}

#[async_trait]
impl EventLogClient for ScriptedEventSource {
    fn enable(&self) -> Result<(), EventLogError> {
        self.enabled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disable(&self) {}

    async fn get_events(&self) -> Result<(), EventLogError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.pull_delay).await;
        let batches = std::mem::take(&mut *self.queued.lock());
        for batch in batches {
            self.subscribers.publish(batch);
        }
        Ok(())
    }

    fn subscribe(&self, handler: EventHandler) -> Subscription {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.subscribers.subscribe(handler, |_| Vec::new())
    }
}

/// In-memory destination that records whether it was shut down
#[derive(Clone, Default)]
pub struct SharedBuffer {
    pub bytes: Arc<Mutex<Vec<u8>>>,
    pub shut_down: Arc<AtomicUsize>,
}

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    pub fn was_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst) > 0
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.bytes.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.shut_down.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// Destination that can stall every write or fail to shut down
#[derive(Clone, Default)]
pub struct ScriptedWriter {
    pub stall_writes: bool,
    pub fail_shutdown: bool,
    pub written: Arc<AtomicUsize>,
    pub shutdowns: Arc<AtomicUsize>,
}

impl AsyncWrite for ScriptedWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if self.stall_writes {
            return Poll::Pending;
        }
        self.written.fetch_add(buf.len(), Ordering::SeqCst);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.fail_shutdown {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "destination closed",
            )));
        }
        Poll::Ready(Ok(()))
    }
}
