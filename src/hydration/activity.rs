//! Sync activity reporting consumed by the desktop shell.

use crate::error::{FileSystemErrorCode, HydrationError};
use crate::types::{AltId, NodeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncActivityType {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncActivityStage {
    Preparation,
    Execution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncActivityStatus {
    InProgress,
    Succeeded,
    Warning,
    Cancelled,
    Failed,
}

impl SyncActivityStatus {
    /// Terminal status a failure with `code` is reported as
    pub fn for_error_code(code: FileSystemErrorCode) -> Self {
        match code {
            FileSystemErrorCode::SharingViolation => SyncActivityStatus::Warning,
            FileSystemErrorCode::Cancelled
            | FileSystemErrorCode::TransferAbortedDueToFileChange => SyncActivityStatus::Cancelled,
            _ => SyncActivityStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SyncActivityStatus::InProgress)
    }
}

/// One activity as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncActivityItem {
    /// Unknown until the demand resolves to a tree node
    pub node_id: Option<NodeId>,
    pub alt_id: AltId,
    pub name: String,
    pub activity_type: SyncActivityType,
    pub stage: SyncActivityStage,
    pub status: SyncActivityStatus,
    pub size: u64,
    pub progress: u64,
    pub error_code: Option<FileSystemErrorCode>,
}

impl SyncActivityItem {
    pub fn download(alt_id: AltId, name: impl Into<String>, size: u64) -> Self {
        Self {
            node_id: None,
            alt_id,
            name: name.into(),
            activity_type: SyncActivityType::Download,
            stage: SyncActivityStage::Preparation,
            status: SyncActivityStatus::InProgress,
            size,
            progress: 0,
            error_code: None,
        }
    }
}

/// Receiver of activity updates. Every tracked activity ends with exactly one
/// terminal call: `on_changed` with `Succeeded`, `on_warning`, `on_cancelled`
/// or `on_failed`.
pub trait SyncActivitySink: Send + Sync {
    fn on_progress(&self, item: &SyncActivityItem);

    fn on_changed(&self, item: &SyncActivityItem);

    fn on_warning(&self, item: &SyncActivityItem, error: &HydrationError);

    fn on_cancelled(&self, item: &SyncActivityItem);

    fn on_failed(&self, item: &SyncActivityItem, error: &HydrationError);
}
