use std::sync::Arc;

use anyhow::{Error, Result};
use tracing::{debug, error, info, trace, warn};

use crate::config::RemoveConfig;
use crate::monitor::RemoveMonitor;
use crate::storage::with_force_retry;
use crate::types::error::{StorageError, storage_error_of};
use crate::types::{ObjectDescriptor, OperationKind, RemovalItem, UploadDescriptor};

use super::stage::Stage;

pub struct ObjectRemover {
    worker_index: u16,
    base: Stage<RemovalItem>,
    config: Arc<RemoveConfig>,
    monitor: Arc<RemoveMonitor>,
}

impl ObjectRemover {
    pub fn new(
        base: Stage<RemovalItem>,
        worker_index: u16,
        config: Arc<RemoveConfig>,
        monitor: Arc<RemoveMonitor>,
    ) -> Self {
        Self {
            worker_index,
            base,
            config,
            monitor,
        }
    }

    pub async fn remove_target(&self) -> Result<()> {
        trace!(
            worker_index = self.worker_index,
            "remove worker has started."
        );
        self.receive_and_remove().await
    }

    async fn receive_and_remove(&self) -> Result<()> {
        let receiver = self.base.receiver()?;
        loop {
            tokio::select! {
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(item) => {
                            if let Err(e) = self.remove(&item).await {
                                self.base.cancellation_token.cancel();
                                error!(worker_index = self.worker_index, "remove worker has been cancelled with error.");
                                return Err(e);
                            }
                        },
                        Err(_) => {
                            trace!(worker_index = self.worker_index, "remove worker has been completed.");
                            break;
                        }
                    }
                },
                _ = self.base.cancellation_token.cancelled() => {
                    info!(worker_index = self.worker_index, "remove worker has been cancelled.");
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn remove(&self, item: &RemovalItem) -> Result<()> {
        let result = match item {
            RemovalItem::Object(object) => self.remove_object(object).await,
            RemovalItem::MultipartUpload(upload) => self.abort_upload(upload).await,
        };
        let Err(e) = result else {
            return Ok(());
        };
        if self.base.cancellation_token.is_cancelled() {
            return Ok(());
        }

        match item {
            RemovalItem::Object(_) => self.monitor.update_err_object_num(1),
            RemovalItem::MultipartUpload(_) => self.monitor.update_err_upload_id_num(1),
        }
        self.handle_error(item, e)
    }

    async fn remove_object(&self, object: &ObjectDescriptor) -> Result<()> {
        let storage = self.base.storage()?;
        let bucket = self.config.target.bucket.as_str();
        let key = object.full_key();
        let key = key.as_str();
        let all_versions = self.config.all_versions;

        let result = with_force_retry(&self.config.force_retry_config, "delete_object", key, || {
            storage.delete_object(bucket, key, all_versions)
        })
        .await;
        match result {
            Ok(()) => {}
            Err(e) if matches!(storage_error_of(&e), Some(StorageError::NoSuchKey(_))) => {
                debug!(key = key, "object has already been removed.");
            }
            Err(e) => return Err(e),
        }

        self.monitor.update_object_num(1);
        trace!(worker_index = self.worker_index, key = key, "object removed.");
        Ok(())
    }

    async fn abort_upload(&self, upload: &UploadDescriptor) -> Result<()> {
        let storage = self.base.storage()?;
        let bucket = self.config.target.bucket.as_str();
        let (key, upload_id) = (upload.key.as_str(), upload.upload_id.as_str());

        let result = with_force_retry(
            &self.config.force_retry_config,
            "abort_multipart_upload",
            key,
            || storage.abort_multipart_upload(bucket, key, upload_id),
        )
        .await;
        match result {
            Ok(()) => {}
            Err(e) if matches!(storage_error_of(&e), Some(StorageError::NoSuchUpload(_))) => {
                debug!(
                    key = key,
                    upload_id = upload_id,
                    "multipart upload has already been aborted."
                );
            }
            Err(e) => return Err(e),
        }

        self.monitor.update_upload_id_num(1);
        trace!(
            worker_index = self.worker_index,
            key = key,
            upload_id = upload_id,
            "multipart upload aborted."
        );
        Ok(())
    }

    // A failed item stops the batch when the error would repeat for every item, or when the
    // batch is a single object delete.
    fn handle_error(&self, item: &RemovalItem, e: Error) -> Result<()> {
        let key = match item {
            RemovalItem::Object(object) => object.full_key(),
            RemovalItem::MultipartUpload(upload) => upload.key.clone(),
        };
        let error = format!("{e:#}");

        let single_object =
            !self.config.recursive && self.config.operation_kind() == OperationKind::OBJECT;
        if single_object {
            self.monitor.set_op(OperationKind::empty());
        }
        if single_object || storage_error_of(&e).is_some_and(StorageError::is_fatal) {
            error!(
                worker_index = self.worker_index,
                key = key,
                error = error,
                "remove failed."
            );
            return Err(e);
        }

        self.base.set_warning();
        warn!(
            worker_index = self.worker_index,
            key = key,
            error = error,
            "remove failed, continuing with the next item."
        );
        Ok(())
    }
}
