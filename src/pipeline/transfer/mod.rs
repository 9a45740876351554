use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConfirmCallback, CopyConfig};
use crate::monitor::CopyMonitor;
use crate::pipeline::report::ReportSink;
use crate::storage::{ObjectEntry, Storage, with_force_retry};
use crate::store::checkpoint::CheckpointStore;
use crate::store::snapshot::{Fingerprint, SnapshotStore};
use crate::types::error::{OssbulkError, StorageError, is_cancelled_error, storage_error_of};
use crate::types::storage_url::CloudUrl;
use crate::types::{TransferItem, TransferOperation};

use super::stage::{SendResult, Stage};

mod copy;
mod download;
pub mod multipart;
mod upload;

/// State shared by all the transfer workers of one batch.
pub struct TransferContext {
    pub config: CopyConfig,
    pub monitor: Arc<CopyMonitor>,
    pub checkpoint_store: CheckpointStore,
    pub snapshot_store: Option<Arc<SnapshotStore>>,
    pub report: Arc<ReportSink>,
    pub confirm_callback: Option<ConfirmCallback>,
    /// Local destination of a download. Ends with a separator when items are placed below it.
    pub download_root: String,
    confirm_lock: Mutex<()>,
}

impl TransferContext {
    pub fn new(
        config: CopyConfig,
        monitor: Arc<CopyMonitor>,
        snapshot_store: Option<Arc<SnapshotStore>>,
        report: Arc<ReportSink>,
        confirm_callback: Option<ConfirmCallback>,
        download_root: String,
    ) -> Self {
        Self {
            checkpoint_store: CheckpointStore::new(&config.checkpoint_dir),
            config,
            monitor,
            snapshot_store,
            report,
            confirm_callback,
            download_root,
            confirm_lock: Mutex::new(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    File(i64),
    Dir,
    Skipped(i64),
    SkippedDir,
}

pub struct ObjectTransferrer {
    worker_index: u16,
    base: Stage<TransferItem>,
    context: Arc<TransferContext>,
}

impl ObjectTransferrer {
    pub fn new(base: Stage<TransferItem>, worker_index: u16, context: Arc<TransferContext>) -> Self {
        Self {
            worker_index,
            base,
            context,
        }
    }

    pub async fn transfer(&self) -> Result<()> {
        trace!(worker_index = self.worker_index, "transfer worker has started.");
        self.receive_and_transfer().await
    }

    async fn receive_and_transfer(&self) -> Result<()> {
        let receiver = self.base.receiver()?;
        loop {
            tokio::select! {
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(item) => {
                            if let Err(e) = self.transfer_item(&item).await {
                                self.base.cancellation_token.cancel();
                                error!(worker_index = self.worker_index, "transfer worker has been cancelled with error.");
                                return Err(e);
                            }
                            if self.base.send(item).await? == SendResult::Closed {
                                return Ok(());
                            }
                        },
                        Err(_) => {
                            trace!(worker_index = self.worker_index, "transfer worker has been completed.");
                            break;
                        }
                    }
                },
                _ = self.base.cancellation_token.cancelled() => {
                    info!(worker_index = self.worker_index, "transfer worker has been cancelled.");
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn transfer_item(&self, item: &TransferItem) -> Result<()> {
        let result = match item {
            TransferItem::File(file) => self.upload_file(file).await,
            TransferItem::Object(object) => match self.context.config.operation {
                TransferOperation::Download => self.download_object(object).await,
                _ => self.copy_object(object).await,
            },
        };

        match result {
            Ok(outcome) => {
                self.record_outcome(outcome);
                Ok(())
            }
            Err(e) => {
                if self.base.cancellation_token.is_cancelled() || is_cancelled_error(&e) {
                    return Ok(());
                }
                self.context.monitor.update_err(0, 1);
                self.handle_item_error(item, e).await
            }
        }
    }

    fn record_outcome(&self, outcome: TransferOutcome) {
        let monitor = &self.context.monitor;
        match outcome {
            TransferOutcome::File(size) => monitor.update_file(size, 1),
            TransferOutcome::Dir => monitor.update_dir(0, 1),
            TransferOutcome::Skipped(size) => monitor.update_skip(size, 1),
            TransferOutcome::SkippedDir => monitor.update_skip_dir(1),
        }
    }

    // Item errors are reported and tolerated in a recursive batch, unless they make every
    // further item fail as well.
    async fn handle_item_error(&self, item: &TransferItem, e: Error) -> Result<()> {
        let source = self.source_name(item);
        let target = self.target_name(item);
        let fatal = storage_error_of(&e).is_some_and(StorageError::is_fatal);
        if fatal || !self.context.config.ignore_item_errors() {
            let error = format!("{e:#}");
            error!(
                worker_index = self.worker_index,
                source = source,
                target = target,
                error = error,
                "transfer failed."
            );
            return Err(e);
        }

        let message = format!(
            "{} {source} to {target} error, info: {}",
            self.context.config.operation.op_str(),
            e.root_cause()
        );
        self.context.report.report_error(&message).await?;
        self.base.set_warning();

        let error = format!("{e:#}");
        warn!(
            worker_index = self.worker_index,
            source = source,
            target = target,
            error = error,
            "transfer failed, the item has been reported."
        );
        Ok(())
    }

    fn source_name(&self, item: &TransferItem) -> String {
        match item {
            TransferItem::File(file) => file.path().to_string_lossy().to_string(),
            TransferItem::Object(object) => match self.context.config.source.as_cloud() {
                Some(source) => source.with_object(&object.full_key()).to_string(),
                None => object.full_key(),
            },
        }
    }

    fn target_name(&self, item: &TransferItem) -> String {
        match (item, self.context.config.target.as_cloud()) {
            (TransferItem::File(file), Some(target)) => {
                target.with_object(&object_name(&target.object, &file.relative_path)).to_string()
            }
            (TransferItem::Object(object), Some(target)) => {
                target.with_object(&object_name(&target.object, &object.key)).to_string()
            }
            (TransferItem::Object(object), None) => self
                .download_path(&object.key)
                .to_string_lossy()
                .to_string(),
            (TransferItem::File(file), None) => file.relative_path.clone(),
        }
    }

    fn storage(&self) -> Result<&Storage> {
        self.base.storage()
    }

    fn source_cloud_url(&self) -> Result<&CloudUrl> {
        self.context
            .config
            .source
            .as_cloud()
            .ok_or_else(|| anyhow!("the source is not a cloud url."))
    }

    fn target_cloud_url(&self) -> Result<&CloudUrl> {
        self.context
            .config
            .target
            .as_cloud()
            .ok_or_else(|| anyhow!("the destination is not a cloud url."))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.base.cancellation_token.is_cancelled() {
            return Err(anyhow!(OssbulkError::Cancelled));
        }
        Ok(())
    }

    /// The destination object, `None` when it does not exist or cannot be read.
    async fn head_target(&self, bucket: &str, key: &str) -> Option<ObjectEntry> {
        let storage = self.storage().ok()?;
        match with_force_retry(&self.context.config.force_retry_config, "head_object", key, || {
            storage.head_object(bucket, key)
        })
        .await
        {
            Ok(entry) => Some(entry),
            Err(e) => {
                if !matches!(storage_error_of(&e), Some(StorageError::NoSuchKey(_))) {
                    let error = e.to_string();
                    debug!(key = key, error = error, "head_object() of the destination failed.");
                }
                None
            }
        }
    }

    fn is_out_of_time_window(&self, last_modified: &DateTime<Utc>) -> bool {
        self.context
            .config
            .filter_config
            .is_out_of_time_window(last_modified)
    }

    async fn is_snapshot_unchanged(&self, key: &str, fingerprint: &Fingerprint) -> bool {
        match &self.context.snapshot_store {
            Some(store) => store.should_skip(key, fingerprint).await,
            None => false,
        }
    }

    // The item has already arrived, so a failed record only costs a transfer next time.
    async fn record_snapshot(&self, key: &str, fingerprint: Fingerprint) {
        let Some(store) = &self.context.snapshot_store else {
            return;
        };
        if let Err(e) = store.record(key, fingerprint).await {
            let error = format!("{e:#}");
            warn!(
                worker_index = self.worker_index,
                key = key,
                error = error,
                "failed to record snapshot."
            );
        }
    }

    /// Whether an existing destination may be replaced. Without a callback it may.
    async fn confirm_overwrite(&self, target: &str) -> bool {
        let Some(callback) = self.context.confirm_callback.clone() else {
            return true;
        };

        let _guard = self.context.confirm_lock.lock().await;
        let prompt = format!("cp: overwrite \"{target}\"(y or N)? ");
        match tokio::task::spawn_blocking(move || callback.confirm(&prompt)).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                let error = e.to_string();
                warn!(error = error, "overwrite confirmation failed.");
                false
            }
        }
    }
}

/// The destination key of an item. A destination naming a directory receives the relative
/// key below it, any other destination is taken as the object name itself.
pub fn object_name(dest_object: &str, relative_key: &str) -> String {
    if dest_object.is_empty() || dest_object.ends_with('/') {
        return format!("{dest_object}{relative_key}");
    }
    dest_object.to_string()
}
