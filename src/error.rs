//! Error types for the adapter.
//!
//! Structural errors (`RevisionError` variants other than `FileSystem`) tell the
//! caller to re-evaluate, usually by re-enumerating. `FileSystemError` carries a
//! platform/transport failure code.

use crate::types::{AltId, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Platform and transport failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileSystemErrorCode {
    ObjectNotFound,
    DirectoryNotFound,
    PathNotFound,
    UnauthorizedAccess,
    FreeSpaceExceeded,
    SharingViolation,
    TooManyChildren,
    DuplicateName,
    InvalidName,
    Partial,
    Unknown,
    CloudFileProviderNotRunning,
    CyclicRedundancyCheck,
    IntegrityFailure,
    TransferAbortedDueToFileChange,
    LastWriteTimeTooRecent,
    MetadataMismatch,
    Cancelled,
}

impl FileSystemErrorCode {
    /// Map an I/O error kind onto the closest code
    pub fn from_io_kind(kind: std::io::ErrorKind) -> Self {
        match kind {
            std::io::ErrorKind::NotFound => FileSystemErrorCode::ObjectNotFound,
            std::io::ErrorKind::PermissionDenied => FileSystemErrorCode::UnauthorizedAccess,
            std::io::ErrorKind::AlreadyExists => FileSystemErrorCode::DuplicateName,
            std::io::ErrorKind::InvalidInput => FileSystemErrorCode::InvalidName,
            std::io::ErrorKind::UnexpectedEof => FileSystemErrorCode::Partial,
            std::io::ErrorKind::Interrupted => FileSystemErrorCode::Cancelled,
            _ => FileSystemErrorCode::Unknown,
        }
    }
}

impl fmt::Display for FileSystemErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A failure reported by a file system client, local or remote
#[derive(Debug, Clone, Error)]
#[error("{message} ({code})")]
pub struct FileSystemError {
    pub code: FileSystemErrorCode,
    pub message: String,
}

impl FileSystemError {
    pub fn new(code: FileSystemErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FileSystemErrorCode::Cancelled, "Operation cancelled")
    }
}

impl From<std::io::Error> for FileSystemError {
    fn from(err: std::io::Error) -> Self {
        FileSystemError::new(FileSystemErrorCode::from_io_kind(err.kind()), err.to_string())
    }
}

/// Link store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Adapter tree operation errors; hooks veto a pending operation with these
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Node already exists: {0}")]
    NodeExists(NodeId),

    #[error("Alternate id {0} already belongs to node {1}")]
    AltIdInUse(AltId, NodeId),

    #[error("Parent {0} is not a directory")]
    ParentNotDirectory(NodeId),

    #[error("Moving node {0} under {1} would create a cycle")]
    MoveCycle(NodeId, NodeId),

    #[error("Content version of node {id} cannot decrease ({current} -> {requested})")]
    ContentVersionDecreased {
        id: NodeId,
        current: u64,
        requested: u64,
    },

    #[error("Operation on node {0} vetoed: {1}")]
    Vetoed(NodeId, String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// File revision read errors
#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Node {0} is not a file")]
    NotAFile(NodeId),

    #[error("Sync root of node {0} is disabled")]
    RootDisabled(NodeId),

    #[error("Node {0} is a dirty placeholder")]
    DirtyPlaceholder(NodeId),

    #[error("Node {0} or its branch is deleted")]
    NodeOrBranchDeleted(NodeId),

    #[error("Content version diverged on node {id}: expected {expected}, found {actual}")]
    ContentVersionDiverged {
        id: NodeId,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    FileSystem(#[from] FileSystemError),
}

impl RevisionError {
    /// File-system code the error surfaces as
    pub fn error_code(&self) -> FileSystemErrorCode {
        match self {
            RevisionError::NodeNotFound(_) => FileSystemErrorCode::ObjectNotFound,
            RevisionError::NotAFile(_) => FileSystemErrorCode::ObjectNotFound,
            RevisionError::RootDisabled(_) => FileSystemErrorCode::CloudFileProviderNotRunning,
            RevisionError::DirtyPlaceholder(_) => FileSystemErrorCode::MetadataMismatch,
            RevisionError::NodeOrBranchDeleted(_) => FileSystemErrorCode::ObjectNotFound,
            RevisionError::ContentVersionDiverged { .. } => {
                FileSystemErrorCode::TransferAbortedDueToFileChange
            }
            RevisionError::FileSystem(e) => e.code,
        }
    }

    /// Structural errors mean the caller should re-enumerate rather than retry
    pub fn is_structural(&self) -> bool {
        !matches!(self, RevisionError::FileSystem(_))
    }
}

/// Hydration failure wrapping the file-system error that caused it
#[derive(Debug, Clone, Error)]
#[error("Hydration of {name} failed: {message}")]
pub struct HydrationError {
    pub name: String,
    pub message: String,
    #[source]
    pub source: FileSystemError,
}

impl HydrationError {
    pub fn new(name: impl Into<String>, message: impl Into<String>, source: FileSystemError) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            source,
        }
    }

    pub fn code(&self) -> FileSystemErrorCode {
        self.source.code
    }
}

/// Event log source errors; `Clone` so a coalesced pull can hand its result to
/// every waiter
#[derive(Debug, Clone, Error)]
pub enum EventLogError {
    #[error("Event source unavailable: {0}")]
    Unavailable(String),

    #[error("Event source failed: {0}")]
    Failed(String),
}

/// Crate-level error
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Tree error: {0}")]
    TreeError(#[from] TreeError),

    #[error(transparent)]
    RevisionError(#[from] RevisionError),

    #[error(transparent)]
    HydrationError(#[from] HydrationError),

    #[error(transparent)]
    EventLogError(#[from] EventLogError),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Node {0} is not a file")]
    NotAFile(NodeId),

    #[error("Copy of node {source_id} to {destination_id} would form a cycle")]
    CopyCycle {
        source_id: NodeId,
        destination_id: NodeId,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for AdapterError {
    fn from(err: config::ConfigError) -> Self {
        AdapterError::ConfigError(err.to_string())
    }
}
