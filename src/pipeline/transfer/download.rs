use std::io::{SeekFrom, Write};
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::storage::local::fs_util;
use crate::storage::{ByteRange, resolve_range, with_force_retry};
use crate::store::checkpoint::{CheckpointRecord, CheckpointSession, SourceFingerprint};
use crate::store::snapshot::{Fingerprint, download_snapshot_key};
use crate::types::ObjectDescriptor;
use crate::types::error::OssbulkError;

use super::multipart::PartPlan;
use super::{ObjectTransferrer, TransferOutcome};

const TEMP_SUFFIX: &str = ".temp";

impl ObjectTransferrer {
    pub(super) async fn download_object(
        &self,
        object: &ObjectDescriptor,
    ) -> Result<TransferOutcome> {
        if fs_util::check_directory_traversal(&object.key) {
            return Err(anyhow!(OssbulkError::DirectoryTraversalError))
                .with_context(|| format!("key: {}", object.key));
        }

        let source = self.source_cloud_url()?;
        let full_key = object.full_key();
        let source_url = source.with_object(&full_key).to_string();
        let dest_path = self.download_path(&object.key);
        let absolute_dest = std::path::absolute(&dest_path)
            .unwrap_or_else(|_| dest_path.clone())
            .to_string_lossy()
            .to_string();
        let snapshot_key = download_snapshot_key(&source_url, &absolute_dest);

        if object.is_dir_marker() {
            tokio::fs::create_dir_all(&dest_path)
                .await
                .with_context(|| format!("failed to create directory: {}", dest_path.display()))?;
            return Ok(TransferOutcome::Dir);
        }

        let size = object.size as u64;
        let range = match &self.context.config.range {
            Some(range) => Some(resolve_range(range, size).with_context(|| source_url.clone())?),
            None => None,
        };
        let transfer_size = range.map_or(size, |range| range.length);
        let fingerprint = Fingerprint {
            size,
            last_modified: object.last_modified.timestamp(),
        };

        if self
            .should_skip_download(&dest_path, &snapshot_key, &fingerprint, &object.last_modified)
            .await
        {
            debug!(
                worker_index = self.worker_index,
                source = source_url,
                "download skipped."
            );
            return Ok(TransferOutcome::Skipped(transfer_size as i64));
        }

        fs_util::create_parent_directory(&dest_path).await?;

        let partial_range = range.filter(|range| !range.is_full(size));
        if partial_range.is_none()
            && size > 0
            && self
                .context
                .config
                .transfer_config
                .is_multipart_required(size)
        {
            let plan = PartPlan::new(size, &self.context.config.transfer_config);
            let checkpoint_fingerprint = SourceFingerprint {
                source: source_url.clone(),
                dest: dest_path.to_string_lossy().to_string(),
                size,
                last_modified: fingerprint.last_modified,
                part_size: plan.part_size,
                part_count: plan.part_count,
            };
            self.download_parts(checkpoint_fingerprint, &source.bucket, &full_key, &dest_path, &plan)
                .await?;
        } else {
            self.download_single(&source.bucket, &full_key, partial_range, transfer_size, &dest_path)
                .await?;
        }

        fs_util::set_last_modified(&dest_path, &object.last_modified)
            .with_context(|| format!("failed to set last modified: {}", dest_path.display()))?;
        self.record_snapshot(&snapshot_key, fingerprint).await;

        debug!(
            worker_index = self.worker_index,
            source = source_url,
            size = transfer_size,
            "download completed."
        );
        Ok(TransferOutcome::File(transfer_size as i64))
    }

    /// The local file a key is written to.
    pub(super) fn download_path(&self, key: &str) -> PathBuf {
        let root = &self.context.download_root;
        if root.ends_with('/') || root.ends_with(MAIN_SEPARATOR) {
            return fs_util::key_to_file_path(Path::new(root), key);
        }
        PathBuf::from(root)
    }

    async fn should_skip_download(
        &self,
        dest_path: &Path,
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
            return match fs_util::get_last_modified(dest_path).await {
                Ok(local_last_modified) => {
                    last_modified.timestamp() <= local_last_modified.timestamp()
                }
                Err(_) => false,
            };
        }

        if config.force {
            return false;
        }
        match tokio::fs::metadata(dest_path).await {
            Ok(metadata) if metadata.is_dir() => true,
            Ok(_) => {
                !self
                    .confirm_overwrite(&dest_path.to_string_lossy())
                    .await
            }
            Err(_) => false,
        }
    }

    async fn download_single(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
        expected_size: u64,
        dest_path: &Path,
    ) -> Result<()> {
        let storage = self.storage()?;
        let body = with_force_retry(
            &self.context.config.force_retry_config,
            "get_object",
            key,
            || storage.get_object(bucket, key, range),
        )
        .await?;
        if body.len() as u64 != expected_size {
            return Err(anyhow!(OssbulkError::SourceChanged(key.to_string())));
        }

        let mut temp_file = fs_util::create_temp_file_next_to(dest_path).await?;
        let dest_path = dest_path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            temp_file
                .write_all(&body)
                .context("NamedTempFile::write_all() failed.")?;
            temp_file
                .persist(&dest_path)
                .context("NamedTempFile::persist() failed.")?;
            Ok(())
        })
        .await
        .context("spawn_blocking() failed.")?
    }

    // Parts are written at their offsets into `<dest>.temp`, which is renamed once every
    // part is in place. A checkpoint is resumed only while its temp file still exists.
    async fn download_parts(
        &self,
        fingerprint: SourceFingerprint,
        bucket: &str,
        key: &str,
        dest_path: &Path,
        plan: &PartPlan,
    ) -> Result<()> {
        let store = &self.context.checkpoint_store;
        let temp_path = PathBuf::from(format!("{}{TEMP_SUFFIX}", dest_path.display()));
        let size = fingerprint.size;

        let temp_exists = tokio::fs::try_exists(&temp_path).await.unwrap_or(false);
        let record = match store.load(&fingerprint.source, &fingerprint.dest).await {
            Some(record) if temp_exists && record.is_valid_for(&fingerprint) => {
                let completed_parts = record.completed_parts.len();
                debug!(
                    key = key,
                    completed_parts = completed_parts,
                    "download resumed from checkpoint."
                );
                record
            }
            stale => {
                if stale.is_some() {
                    debug!(key = key, "checkpoint does not match the source.");
                    store
                        .remove(&fingerprint.source, &fingerprint.dest)
                        .await?;
                }
                let file = tokio::fs::File::create(&temp_path)
                    .await
                    .with_context(|| format!("failed to create file: {}", temp_path.display()))?;
                file.set_len(size)
                    .await
                    .context("tokio::fs::File::set_len() failed.")?;
                CheckpointRecord::new(fingerprint, None)
            }
        };
        let session = CheckpointSession::new(store.clone(), record);

        let missing_parts = session.snapshot().await.missing_parts();
        let storage = self.storage()?;
        let retry_config = &self.context.config.force_retry_config;
        let session_ref = &session;
        let temp_path_ref = temp_path.as_path();
        stream::iter(missing_parts)
            .map(move |part_number| async move {
                self.check_cancelled()?;

                let range = plan.range_of(part_number, size);
                let body = with_force_retry(retry_config, "get_object", key, || {
                    storage.get_object(bucket, key, Some(range))
                })
                .await?;
                if body.len() as u64 != range.length {
                    return Err(anyhow!(OssbulkError::SourceChanged(key.to_string())));
                }

                write_at(temp_path_ref, range.offset, &body).await?;
                session_ref.record_part(part_number, "").await?;

                trace!(
                    worker_index = self.worker_index,
                    key = key,
                    part_number = part_number,
                    "part has been downloaded."
                );
                Ok(())
            })
            .buffer_unordered(plan.parallel)
            .try_collect::<Vec<()>>()
            .await?;

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("failed to open file: {}", temp_path.display()))?;
        file.set_len(size)
            .await
            .context("tokio::fs::File::set_len() failed.")?;
        file.sync_all()
            .await
            .context("tokio::fs::File::sync_all() failed.")?;
        drop(file);

        tokio::fs::rename(&temp_path, dest_path)
            .await
            .with_context(|| format!("failed to rename file: {}", temp_path.display()))?;
        session.finalize().await
    }
}

async fn write_at(path: &Path, offset: u64, body: &[u8]) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open file: {}", path.display()))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .context("tokio::fs::File::seek() failed.")?;
    file.write_all(body)
        .await
        .context("tokio::fs::File::write_all() failed.")?;
    file.flush()
        .await
        .context("tokio::fs::File::flush() failed.")?;
    Ok(())
}
