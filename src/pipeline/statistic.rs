use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, trace, warn};

use crate::config::{CopyConfig, RemoveConfig};
use crate::monitor::{CopyMonitor, RemoveMonitor};
use crate::pipeline::lister::{CloudObjectPager, UploadPager, head_single_object};
use crate::storage::local::LocalFileLister;
use crate::storage::{Storage, resolve_range};
use crate::types::storage_url::{CloudUrl, StorageUrl};
use crate::types::{FileDescriptor, OperationKind, PipelineCancellationToken, TransferOperation};

/// Enumerates the source of a copy batch a second time to fill in the monitor totals.
pub struct CopyStatistic {
    storage: Storage,
    config: CopyConfig,
    max_keys: i32,
    monitor: Arc<CopyMonitor>,
    cancellation_token: PipelineCancellationToken,
}

impl CopyStatistic {
    pub fn new(
        storage: Storage,
        config: CopyConfig,
        max_keys: i32,
        monitor: Arc<CopyMonitor>,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            storage,
            config,
            max_keys,
            monitor,
            cancellation_token,
        }
    }

    pub async fn collect(&self) {
        trace!("copy statistic has started.");

        match self.scan().await {
            Ok(()) => {
                self.monitor.set_scan_end();
                let total_num = self.monitor.total_num();
                let total_size = self.monitor.total_size();
                debug!(
                    total_num = total_num,
                    total_size = total_size,
                    "copy statistic has been completed."
                );
            }
            Err(e) => {
                self.monitor.set_scan_error();
                let error = e.to_string();
                warn!(error = error, "copy statistic failed.");
            }
        }
    }

    async fn scan(&self) -> Result<()> {
        match &self.config.source {
            StorageUrl::File(file_url) => self.scan_local(Path::new(&file_url.path)).await,
            StorageUrl::Cloud(cloud_url) if self.config.recursive => {
                self.scan_cloud(cloud_url).await
            }
            StorageUrl::Cloud(cloud_url) => {
                if let Some(object) = head_single_object(
                    &self.storage,
                    cloud_url,
                    &self.config.force_retry_config,
                )
                .await?
                {
                    self.monitor.update_scan(self.scan_size(object.size), 1);
                }
                Ok(())
            }
        }
    }

    async fn scan_local(&self, path: &Path) -> Result<()> {
        let lister = LocalFileLister::new(
            path,
            self.config.follow_symlinks,
            self.config.only_current_dir,
            Some(&self.config.checkpoint_dir),
            self.cancellation_token.clone(),
        );
        let (sender, receiver) = async_channel::bounded::<FileDescriptor>(super::CHANNEL_CAPACITY);

        let produce = async move {
            let result = lister.list(&sender).await;
            sender.close();
            result
        };
        let consume = async {
            while let Ok(file) = receiver.recv().await {
                if file.is_dir() {
                    if !self.config.disable_dir_object {
                        self.monitor.update_scan(0, 1);
                    }
                    continue;
                }
                if !self.config.filter_config.rules.matches(&file) {
                    continue;
                }
                let size = tokio::fs::metadata(file.path())
                    .await
                    .map(|metadata| metadata.len() as i64)
                    .unwrap_or(0);
                self.monitor.update_scan(size, 1);
            }
        };

        let (result, _) = tokio::join!(produce, consume);
        result
    }

    async fn scan_cloud(&self, cloud_url: &CloudUrl) -> Result<()> {
        let mut pager = CloudObjectPager::new(
            &self.storage,
            cloud_url,
            self.config.only_current_dir,
            self.max_keys,
            self.config.force_retry_config,
        );

        while let Some(objects) = pager.next_page().await? {
            if self.cancellation_token.is_cancelled() {
                return Ok(());
            }
            for object in objects {
                if self.config.filter_config.rules.matches(&object) {
                    self.monitor.update_scan(self.scan_size(object.size), 1);
                }
            }
        }

        Ok(())
    }

    // A download of a byte range only moves the bytes of the range.
    fn scan_size(&self, size: i64) -> i64 {
        match (&self.config.range, self.config.operation) {
            (Some(range), TransferOperation::Download) => resolve_range(range, size as u64)
                .map(|range| range.length as i64)
                .unwrap_or(0),
            _ => size,
        }
    }
}

/// Counts the objects and multipart uploads a removal batch is going to delete.
pub struct RemoveStatistic {
    storage: Storage,
    config: RemoveConfig,
    max_keys: i32,
    monitor: Arc<RemoveMonitor>,
    cancellation_token: PipelineCancellationToken,
}

impl RemoveStatistic {
    pub fn new(
        storage: Storage,
        config: RemoveConfig,
        max_keys: i32,
        monitor: Arc<RemoveMonitor>,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            storage,
            config,
            max_keys,
            monitor,
            cancellation_token,
        }
    }

    pub async fn collect(&self) {
        trace!("remove statistic has started.");

        match self.scan().await {
            Ok(()) => {
                self.monitor.set_scan_end();
                trace!("remove statistic has been completed.");
            }
            Err(e) => {
                self.monitor.set_scan_error();
                let error = e.to_string();
                warn!(error = error, "remove statistic failed.");
            }
        }
    }

    async fn scan(&self) -> Result<()> {
        let kind = self.config.operation_kind();
        if kind.contains(OperationKind::OBJECT) {
            self.scan_objects().await?;
        }
        if kind.contains(OperationKind::MULTIPART_UPLOAD) {
            self.scan_uploads().await?;
        }
        Ok(())
    }

    async fn scan_objects(&self) -> Result<()> {
        if !self.config.recursive {
            if head_single_object(
                &self.storage,
                &self.config.target,
                &self.config.force_retry_config,
            )
            .await?
            .is_some()
            {
                self.monitor.update_scan_object_num(1);
            }
            return Ok(());
        }

        let mut pager = CloudObjectPager::new(
            &self.storage,
            &self.config.target,
            false,
            self.max_keys,
            self.config.force_retry_config,
        )
        .with_full_keys();

        while let Some(objects) = pager.next_page().await? {
            if self.cancellation_token.is_cancelled() {
                return Ok(());
            }
            let count = self
                .config
                .filter_config
                .rules
                .filter_many(objects)
                .len();
            self.monitor.update_scan_object_num(count as i64);
        }

        Ok(())
    }

    async fn scan_uploads(&self) -> Result<()> {
        let mut pager = UploadPager::new(
            &self.storage,
            &self.config.target,
            !self.config.recursive,
            self.max_keys,
            self.config.force_retry_config,
        );

        while let Some(uploads) = pager.next_page().await? {
            if self.cancellation_token.is_cancelled() {
                return Ok(());
            }
            let count = uploads
                .iter()
                .filter(|upload| self.config.filter_config.rules.matches(upload.key.as_str()))
                .count();
            self.monitor.update_scan_upload_id_num(count as i64);
        }

        Ok(())
    }
}
