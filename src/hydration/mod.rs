//! On-demand content materialization for dehydrated placeholders.
//!
//! A demand is resolved against the local adapter tree, checked against the
//! platform's view of the placeholder, mapped to its remote node and then
//! served from a file revision of that node. Every call reports exactly one
//! terminal outcome to the activity sink.

pub mod activity;
pub mod mapping;

pub use activity::{
    SyncActivityItem, SyncActivitySink, SyncActivityStage, SyncActivityStatus, SyncActivityType,
};
pub use mapping::{IdentityMapping, MappedNode, SizeCorrection};

use crate::config::HydrationConfig;
use crate::error::{FileSystemError, FileSystemErrorCode, HydrationError};
use crate::revision::FileRevisionProvider;
use crate::tree::{NodeModel, SharedAdapterTree};
use crate::types::{AltId, NodeId};
use chrono::{DateTime, Utc};
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Request from the placeholder layer to fill one file
pub struct HydrationDemand {
    pub name: String,
    pub alt_id: AltId,
    /// Size the platform currently reports for the placeholder
    pub size: u64,
    /// Last write time the platform currently reports for the placeholder
    pub last_write_time: DateTime<Utc>,
    pub output: Box<dyn AsyncWrite + Send + Unpin>,
}

impl fmt::Debug for HydrationDemand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HydrationDemand")
            .field("name", &self.name)
            .field("alt_id", &self.alt_id)
            .field("size", &self.size)
            .field("last_write_time", &self.last_write_time)
            .finish_non_exhaustive()
    }
}

pub struct HydrationDemandHandler {
    tree: SharedAdapterTree,
    mapping: Arc<dyn IdentityMapping>,
    revisions: Arc<dyn FileRevisionProvider>,
    size_correction: Arc<dyn SizeCorrection>,
    activity: Arc<dyn SyncActivitySink>,
    progress_granularity: u64,
    buffer_size: usize,
}

impl HydrationDemandHandler {
    pub fn new(
        tree: SharedAdapterTree,
        mapping: Arc<dyn IdentityMapping>,
        revisions: Arc<dyn FileRevisionProvider>,
        size_correction: Arc<dyn SizeCorrection>,
        activity: Arc<dyn SyncActivitySink>,
        config: &HydrationConfig,
    ) -> Self {
        Self {
            tree,
            mapping,
            revisions,
            size_correction,
            activity,
            progress_granularity: config.progress_granularity_bytes.max(1),
            buffer_size: config.buffer_size.max(1),
        }
    }

    /// Serve one hydration demand.
    ///
    /// Independent calls are not de-duplicated. On any failure the destination
    /// has been shut down and the error has already been reported to the
    /// activity sink.
    pub async fn handle(
        &self,
        demand: HydrationDemand,
        cancel: CancellationToken,
    ) -> Result<(), HydrationError> {
        let HydrationDemand {
            name,
            alt_id,
            size,
            last_write_time,
            mut output,
        } = demand;
        let mut item = SyncActivityItem::download(alt_id, name.as_str(), size);

        let result = match self
            .hydrate(&name, alt_id, size, last_write_time, &mut output, &cancel, &mut item)
            .await
        {
            Ok(()) => output.shutdown().await.map_err(|e| {
                HydrationError::new(name.as_str(), "Failed to close destination", e.into())
            }),
            Err(error) => {
                if let Err(e) = output.shutdown().await {
                    debug!(
                        alt_id = %alt_id,
                        error = %e,
                        "Failed to close destination after error"
                    );
                }
                Err(error)
            }
        };

        match result {
            Ok(()) => {
                item.status = SyncActivityStatus::Succeeded;
                info!(alt_id = %alt_id, name = %name, bytes = item.progress, "Hydration succeeded");
                self.activity.on_changed(&item);
                Ok(())
            }
            Err(error) => {
                self.report_failure(&mut item, &error);
                Err(error)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn hydrate(
        &self,
        name: &str,
        alt_id: AltId,
        size: u64,
        last_write_time: DateTime<Utc>,
        output: &mut Box<dyn AsyncWrite + Send + Unpin>,
        cancel: &CancellationToken,
        item: &mut SyncActivityItem,
    ) -> Result<(), HydrationError> {
        let (node_id, snapshot) = self.resolve(name, alt_id)?;
        item.node_id = Some(node_id);
        item.size = snapshot.size;

        if snapshot.size != size || snapshot.last_write_time != last_write_time {
            debug!(
                node_id,
                tracked_size = snapshot.size,
                reported_size = size,
                "Placeholder no longer matches tracked metadata"
            );
            return Err(HydrationError::new(
                name,
                "Placeholder metadata differs from the tracked node",
                FileSystemError::new(
                    FileSystemErrorCode::MetadataMismatch,
                    format!(
                        "reported size {} at {}, tracked size {} at {}",
                        size, last_write_time, snapshot.size, snapshot.last_write_time
                    ),
                ),
            ));
        }

        let mapped = self.mapping.get_mapped_node_id_or_default(node_id).ok_or_else(|| {
            HydrationError::new(
                name,
                "Node has no remote counterpart",
                FileSystemError::new(
                    FileSystemErrorCode::ObjectNotFound,
                    format!("Node {} is not mapped", node_id),
                ),
            )
        })?;

        if cancel.is_cancelled() {
            return Err(HydrationError::new(
                name,
                "Hydration cancelled",
                FileSystemError::cancelled(),
            ));
        }

        let mut revision = self
            .revisions
            .open_file_for_reading(mapped.node_id, mapped.content_version, cancel.clone())
            .await
            .map_err(|e| {
                HydrationError::new(
                    name,
                    "Failed to open source revision",
                    FileSystemError::new(e.error_code(), e.to_string()),
                )
            })?;

        item.stage = SyncActivityStage::Execution;
        self.activity.on_changed(item);

        let expected = snapshot.size;
        let revision_token = revision.token().clone();
        let copied = self
            .copy(&mut revision, output, cancel, &revision_token, item)
            .await;
        drop(revision);

        if item.progress != expected {
            warn!(
                node_id,
                expected,
                written = item.progress,
                "Hydrated size differs from tracked size"
            );
            self.size_correction.schedule(node_id, expected, item.progress);
        }

        copied.map_err(|e| HydrationError::new(name, "Transfer failed", e))
    }

    fn resolve(&self, name: &str, alt_id: AltId) -> Result<(NodeId, NodeModel), HydrationError> {
        let tree = self.tree.lock();
        let not_found = |message: &str| {
            HydrationError::new(
                name,
                message,
                FileSystemError::new(
                    FileSystemErrorCode::ObjectNotFound,
                    format!("{} ({})", message, alt_id),
                ),
            )
        };

        let node = tree
            .get_by_alt_id(&alt_id)
            .ok_or_else(|| not_found("Node not found"))?;
        if !node.is_file() {
            return Err(not_found("Node is not a file"));
        }
        if tree.is_branch_deleted(node.id) {
            return Err(not_found("Node or its branch is deleted"));
        }
        Ok((node.id, node.model.clone()))
    }

    async fn copy<R>(
        &self,
        source: &mut R,
        output: &mut Box<dyn AsyncWrite + Send + Unpin>,
        cancel: &CancellationToken,
        revision_token: &CancellationToken,
        item: &mut SyncActivityItem,
    ) -> Result<(), FileSystemError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = vec![0u8; self.buffer_size];
        let mut next_report = self.progress_granularity;

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FileSystemError::cancelled()),
                _ = revision_token.cancelled() => return Err(file_changed()),
                read = source.read(&mut buffer) => read,
            };
            let read = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    return Err(if cancel.is_cancelled() {
                        FileSystemError::cancelled()
                    } else {
                        file_changed()
                    });
                }
                Err(e) => return Err(e.into()),
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FileSystemError::cancelled()),
                _ = revision_token.cancelled() => return Err(file_changed()),
                written = output.write_all(&buffer[..read]) => written?,
            }
            item.progress += read as u64;

            if item.progress >= next_report {
                self.activity.on_progress(item);
                next_report = item.progress + self.progress_granularity;
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FileSystemError::cancelled()),
            _ = revision_token.cancelled() => Err(file_changed()),
            flushed = output.flush() => flushed.map_err(FileSystemError::from),
        }
    }

    fn report_failure(&self, item: &mut SyncActivityItem, error: &HydrationError) {
        let code = error.code();
        item.error_code = Some(code);
        item.status = SyncActivityStatus::for_error_code(code);
        match item.status {
            SyncActivityStatus::Warning => {
                warn!(alt_id = %item.alt_id, name = %item.name, code = %code, "Hydration deferred");
                self.activity.on_warning(item, error);
            }
            SyncActivityStatus::Cancelled => {
                info!(alt_id = %item.alt_id, name = %item.name, code = %code, "Hydration cancelled");
                self.activity.on_cancelled(item);
            }
            _ => {
                warn!(
                    alt_id = %item.alt_id,
                    name = %item.name,
                    code = %code,
                    error = %error.source,
                    "Hydration failed"
                );
                self.activity.on_failed(item, error);
            }
        }
    }
}

fn file_changed() -> FileSystemError {
    FileSystemError::new(
        FileSystemErrorCode::TransferAbortedDueToFileChange,
        "Source changed during transfer",
    )
}
