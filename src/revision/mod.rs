//! Validated reads of a tracked file's content at a known content version.

pub mod client;

pub use client::{
    FileReadStream, FileSystemClient, LocalFileSystemClient, LogReadFailures, NodeInfo,
    ReadFailureHandler,
};

use crate::concurrency::{ReadCancellationRegistry, ReadRegistration};
use crate::config::RevisionConfig;
use crate::error::{FileSystemError, FileSystemErrorCode, RevisionError};
use crate::tree::{AdapterTree, SharedAdapterTree, SyncRootRegistry};
use crate::types::{AltId, NodeId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// An open read of one file at one content version.
///
/// Reading fails with `Interrupted` once the revision token is cancelled,
/// either by the caller or because a newer read or a change signal pre-empted
/// it. Dropping the revision releases its read registration.
pub struct FileRevision {
    snapshot: NodeInfo,
    token: CancellationToken,
    stream: FileReadStream,
    registration: Option<(Arc<ReadCancellationRegistry>, ReadRegistration)>,
}

impl FileRevision {
    /// A revision not tracked by any registry
    pub fn new(snapshot: NodeInfo, token: CancellationToken, stream: FileReadStream) -> Self {
        Self {
            snapshot,
            token,
            stream,
            registration: None,
        }
    }

    fn registered(
        snapshot: NodeInfo,
        stream: FileReadStream,
        reads: Arc<ReadCancellationRegistry>,
        registration: ReadRegistration,
    ) -> Self {
        Self {
            snapshot,
            token: registration.token.clone(),
            stream,
            registration: Some((reads, registration)),
        }
    }

    pub fn size(&self) -> u64 {
        self.snapshot.size
    }

    pub fn last_write_time(&self) -> DateTime<Utc> {
        self.snapshot.last_write_time
    }

    pub fn content_version(&self) -> u64 {
        self.snapshot.content_version
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Node snapshot the revision was validated against
    pub fn snapshot(&self) -> &NodeInfo {
        &self.snapshot
    }
}

impl AsyncRead for FileRevision {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.token.is_cancelled() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "file revision read cancelled",
            )));
        }
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl Drop for FileRevision {
    fn drop(&mut self) {
        if let Some((reads, registration)) = self.registration.take() {
            reads.end_read(&registration);
        }
    }
}

#[async_trait]
pub trait FileRevisionProvider: Send + Sync {
    /// Open a read of `id` at exactly `expected_content_version`
    async fn open_file_for_reading(
        &self,
        id: NodeId,
        expected_content_version: u64,
        cancel: CancellationToken,
    ) -> Result<FileRevision, RevisionError>;
}

/// Revision provider over an adapter tree and the file system client that
/// serves its content
pub struct TreeFileRevisionProvider {
    tree: SharedAdapterTree,
    sync_roots: Arc<SyncRootRegistry>,
    client: Arc<dyn FileSystemClient>,
    failure_handler: Arc<dyn ReadFailureHandler>,
    reads: Arc<ReadCancellationRegistry>,
    settle_delay: Duration,
}

impl TreeFileRevisionProvider {
    pub fn new(
        tree: SharedAdapterTree,
        sync_roots: Arc<SyncRootRegistry>,
        client: Arc<dyn FileSystemClient>,
        failure_handler: Arc<dyn ReadFailureHandler>,
        settle_delay_ms: u64,
    ) -> Self {
        Self {
            tree,
            sync_roots,
            client,
            failure_handler,
            reads: Arc::new(ReadCancellationRegistry::new()),
            settle_delay: Duration::milliseconds(i64::try_from(settle_delay_ms).unwrap_or(i64::MAX)),
        }
    }

    /// Provider with the settle delay taken from the revision config section
    pub fn from_config(
        config: &RevisionConfig,
        tree: SharedAdapterTree,
        sync_roots: Arc<SyncRootRegistry>,
        client: Arc<dyn FileSystemClient>,
        failure_handler: Arc<dyn ReadFailureHandler>,
    ) -> Self {
        Self::new(tree, sync_roots, client, failure_handler, config.settle_delay_ms)
    }

    /// Cancel the in-flight read of a file whose content just changed
    pub fn file_changed(&self, alt_id: &AltId) -> bool {
        self.reads.file_changed(alt_id)
    }

    pub fn reads(&self) -> &Arc<ReadCancellationRegistry> {
        &self.reads
    }

    fn validate(
        &self,
        tree: &AdapterTree,
        id: NodeId,
        expected_content_version: u64,
    ) -> Result<NodeInfo, RevisionError> {
        let node = tree.get(id).ok_or(RevisionError::NodeNotFound(id))?;
        if !node.is_file() {
            return Err(RevisionError::NotAFile(id));
        }

        match self.sync_roots.sync_root_of(tree, id) {
            Some(root) if root.is_enabled => {}
            _ => return Err(RevisionError::RootDisabled(id)),
        }

        if node.model.status.is_dirty_placeholder() {
            return Err(RevisionError::DirtyPlaceholder(id));
        }
        if tree.is_branch_deleted(id) {
            return Err(RevisionError::NodeOrBranchDeleted(id));
        }

        let actual = node.model.content_version;
        if actual != expected_content_version {
            return Err(RevisionError::ContentVersionDiverged {
                id,
                expected: expected_content_version,
                actual,
            });
        }

        let age = Utc::now().signed_duration_since(node.model.last_write_time);
        if age < self.settle_delay {
            return Err(FileSystemError::new(
                FileSystemErrorCode::LastWriteTimeTooRecent,
                format!("Node {} was written {}ms ago", id, age.num_milliseconds()),
            )
            .into());
        }

        Ok(NodeInfo::from_node(tree, node))
    }
}

#[async_trait]
impl FileRevisionProvider for TreeFileRevisionProvider {
    async fn open_file_for_reading(
        &self,
        id: NodeId,
        expected_content_version: u64,
        cancel: CancellationToken,
    ) -> Result<FileRevision, RevisionError> {
        let snapshot = {
            let tree = self.tree.lock();
            self.validate(&tree, id, expected_content_version)
        };
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(node_id = id, code = %e.error_code(), error = %e, "Rejected file read");
                return Err(e);
            }
        };

        let registration = self.reads.begin_read(snapshot.alt_id, &cancel);
        match self
            .client
            .open_file_for_reading(&snapshot, registration.token.clone())
            .await
        {
            Ok(stream) => {
                debug!(
                    node_id = id,
                    content_version = snapshot.content_version,
                    size = snapshot.size,
                    "Opened file revision"
                );
                Ok(FileRevision::registered(
                    snapshot,
                    stream,
                    self.reads.clone(),
                    registration,
                ))
            }
            Err(e) => {
                self.reads.end_read(&registration);
                warn!(node_id = id, code = %e.code, "Opening file revision failed");
                self.failure_handler.handle_open_failure(&snapshot, &e);
                Err(RevisionError::FileSystem(e))
            }
        }
    }
}
