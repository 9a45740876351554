use std::io::SeekFrom;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::storage::local::fs_util;
use crate::storage::{ByteRange, with_force_retry};
use crate::store::checkpoint::SourceFingerprint;
use crate::store::snapshot::{Fingerprint, upload_snapshot_key};
use crate::types::FileDescriptor;

use super::multipart::PartPlan;
use super::{ObjectTransferrer, TransferOutcome, object_name};

impl ObjectTransferrer {
    pub(super) async fn upload_file(&self, file: &FileDescriptor) -> Result<TransferOutcome> {
        let target = self.target_cloud_url()?;
        let key = object_name(&target.object, &file.relative_path);
        if file.is_dir() {
            return self.upload_dir(&target.bucket, &key).await;
        }

        let path = file.path();
        let size = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("tokio::fs::metadata() failed: {}", path.display()))?
            .len();
        let last_modified = fs_util::get_last_modified(&path).await?;
        let target_url = target.with_object(&key).to_string();
        let absolute_path = std::path::absolute(&path)
            .unwrap_or_else(|_| path.clone())
            .to_string_lossy()
            .to_string();
        let snapshot_key = upload_snapshot_key(&absolute_path, &target_url);
        let fingerprint = Fingerprint {
            size,
            last_modified: last_modified.timestamp(),
        };

        if self
            .should_skip_upload(
                &target.bucket,
                &key,
                &target_url,
                &snapshot_key,
                &fingerprint,
                &last_modified,
            )
            .await
        {
            debug!(
                worker_index = self.worker_index,
                source = absolute_path,
                target = target_url,
                "upload skipped."
            );
            return Ok(TransferOutcome::Skipped(size as i64));
        }

        if size > 0
            && self
                .context
                .config
                .transfer_config
                .is_multipart_required(size)
        {
            let plan = PartPlan::new(size, &self.context.config.transfer_config);
            let source_fingerprint = SourceFingerprint {
                source: absolute_path.clone(),
                dest: target_url.clone(),
                size,
                last_modified: fingerprint.last_modified,
                part_size: plan.part_size,
                part_count: plan.part_count,
            };
            self.upload_parts(source_fingerprint, &path, &target.bucket, &key, &plan)
                .await?;
        } else {
            let body = tokio::fs::read(&path)
                .await
                .with_context(|| format!("tokio::fs::read() failed: {}", path.display()))?;
            let storage = self.storage()?;
            let bucket = target.bucket.as_str();
            let key = key.as_str();
            with_force_retry(
                &self.context.config.force_retry_config,
                "put_object",
                key,
                || storage.put_object(bucket, key, body.clone()),
            )
            .await?;
        }

        self.record_snapshot(&snapshot_key, fingerprint).await;

        debug!(
            worker_index = self.worker_index,
            source = absolute_path,
            target = target_url,
            size = size,
            "upload completed."
        );
        Ok(TransferOutcome::File(size as i64))
    }

    async fn upload_dir(&self, bucket: &str, key: &str) -> Result<TransferOutcome> {
        if self.context.config.disable_dir_object {
            return Ok(TransferOutcome::SkippedDir);
        }

        let storage = self.storage()?;
        with_force_retry(
            &self.context.config.force_retry_config,
            "put_object",
            key,
            || storage.put_object(bucket, key, vec![]),
        )
        .await?;

        debug!(worker_index = self.worker_index, key = key, "directory object created.");
        Ok(TransferOutcome::Dir)
    }

    async fn should_skip_upload(
        &self,
        bucket: &str,
        key: &str,
        target_url: &str,
        snapshot_key: &str,
        fingerprint: &Fingerprint,
        last_modified: &DateTime<Utc>,
    ) -> bool {
        let config = &self.context.config;
        if self.is_out_of_time_window(last_modified) {
            return true;
        }

        if config.snapshot_path.is_some() || config.update {
            if self.is_snapshot_unchanged(snapshot_key, fingerprint).await {
                return true;
            }
            if config.update {
                if let Some(entry) = self.head_target(bucket, key).await {
                    return last_modified.timestamp() <= entry.last_modified.timestamp();
                }
            }
            return false;
        }

        if !config.force && self.head_target(bucket, key).await.is_some() {
            return !self.confirm_overwrite(target_url).await;
        }
        false
    }

    async fn upload_parts(
        &self,
        fingerprint: SourceFingerprint,
        path: &Path,
        bucket: &str,
        key: &str,
        plan: &PartPlan,
    ) -> Result<()> {
        let storage = self.storage()?;
        let retry_config = &self.context.config.force_retry_config;

        self.multipart_upload(
            fingerprint,
            bucket,
            key,
            plan,
            move |upload_id, part_number, range| async move {
                let body = read_file_range(path, range).await?;
                let upload_id = upload_id.as_str();
                with_force_retry(retry_config, "upload_part", key, || {
                    storage.upload_part(bucket, key, upload_id, part_number, body.clone())
                })
                .await
            },
        )
        .await
    }
}

async fn read_file_range(path: &Path, range: ByteRange) -> Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("tokio::fs::File::open() failed: {}", path.display()))?;
    file.seek(SeekFrom::Start(range.offset))
        .await
        .context("tokio::fs::File::seek() failed.")?;

    let mut body = vec![0; range.length as usize];
    file.read_exact(&mut body)
        .await
        .with_context(|| format!("source file has been changed: {}", path.display()))?;
    Ok(body)
}
