//! File system client contract consumed by revision reads, plus a local
//! implementation backed by `tokio::fs`.

use crate::error::{FileSystemError, FileSystemErrorCode};
use crate::tree::{AdapterTree, AdapterTreeNode, NodeType};
use crate::types::{AltId, NodeId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Byte stream returned by a client
pub type FileReadStream = Box<dyn AsyncRead + Send + Unpin>;

/// Point-in-time description of a node, captured under the tree lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub alt_id: AltId,
    pub parent_id: NodeId,
    pub node_type: NodeType,
    /// Path relative to the mapping base, top-level node name first
    pub path: PathBuf,
    pub size: u64,
    pub last_write_time: DateTime<Utc>,
    pub content_version: u64,
}

impl NodeInfo {
    pub fn from_node(tree: &AdapterTree, node: &AdapterTreeNode) -> Self {
        let mut path: PathBuf = tree
            .ancestors(node.id)
            .iter()
            .rev()
            .map(|a| a.name.as_str())
            .collect();
        path.push(&node.name);
        Self {
            id: node.id,
            alt_id: node.alt_id,
            parent_id: node.parent_id,
            node_type: node.node_type,
            path,
            size: node.model.size,
            last_write_time: node.model.last_write_time,
            content_version: node.model.content_version,
        }
    }
}

#[async_trait]
pub trait FileSystemClient: Send + Sync {
    /// Create the directory described by `info`; returns its platform id
    async fn create_directory(&self, info: &NodeInfo) -> Result<AltId, FileSystemError>;

    async fn open_file_for_reading(
        &self,
        info: &NodeInfo,
        cancel: CancellationToken,
    ) -> Result<FileReadStream, FileSystemError>;
}

/// Invoked with the snapshot when opening the underlying stream fails, before
/// the error is returned to the caller
pub trait ReadFailureHandler: Send + Sync {
    fn handle_open_failure(&self, snapshot: &NodeInfo, error: &FileSystemError);
}

/// Failure handler that only records the failure in the log
pub struct LogReadFailures;

impl ReadFailureHandler for LogReadFailures {
    fn handle_open_failure(&self, snapshot: &NodeInfo, error: &FileSystemError) {
        warn!(
            node_id = snapshot.id,
            alt_id = %snapshot.alt_id,
            code = %error.code,
            error = %error.message,
            "Failed to open file for reading"
        );
    }
}

/// Client over a local directory
pub struct LocalFileSystemClient {
    base: PathBuf,
}

impl LocalFileSystemClient {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, info: &NodeInfo) -> PathBuf {
        self.base.join(&info.path)
    }
}

#[cfg(unix)]
fn platform_file_id(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn platform_file_id(_metadata: &std::fs::Metadata) -> u64 {
    0
}

#[async_trait]
impl FileSystemClient for LocalFileSystemClient {
    async fn create_directory(&self, info: &NodeInfo) -> Result<AltId, FileSystemError> {
        let path = self.resolve(info);
        tokio::fs::create_dir(&path).await?;
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(AltId::new(info.alt_id.volume_id, platform_file_id(&metadata)))
    }

    async fn open_file_for_reading(
        &self,
        info: &NodeInfo,
        cancel: CancellationToken,
    ) -> Result<FileReadStream, FileSystemError> {
        let path = self.resolve(info);
        let file = tokio::select! {
            _ = cancel.cancelled() => return Err(FileSystemError::cancelled()),
            opened = tokio::fs::File::open(&path) => opened?,
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(FileSystemError::new(
                FileSystemErrorCode::MetadataMismatch,
                format!("{} is not a file", path.display()),
            ));
        }
        Ok(Box::new(file))
    }
}
