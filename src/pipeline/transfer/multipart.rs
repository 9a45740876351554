use std::future::Future;

use anyhow::{Result, anyhow};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, trace};

use crate::config::TransferConfig;
use crate::storage::{ByteRange, CompletedPart, with_force_retry};
use crate::store::checkpoint::{CheckpointRecord, CheckpointSession, SourceFingerprint};
use crate::types::error::{StorageError, storage_error_of};

use super::ObjectTransferrer;

const MAX_PART_NUM: u64 = 10_000;
const MAX_IDEAL_PART_NUM: u64 = MAX_PART_NUM / 10;
const MIN_IDEAL_PART_NUM: u64 = MAX_PART_NUM / 500;
const MAX_IDEAL_PART_SIZE: u64 = 500 * 1024 * 1024;
const MIN_IDEAL_PART_SIZE: u64 = 1024 * 1024;
const MIN_PART_SIZE: u64 = 100 * 1024;

/// How one object is split into parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    pub part_size: u64,
    pub part_count: u64,
    /// Parts of the object transferred at the same time.
    pub parallel: usize,
}

impl PartPlan {
    pub fn new(size: u64, transfer_config: &TransferConfig) -> Self {
        let (part_size, part_count) = match transfer_config.part_size {
            Some(part_size) if part_size > 0 => fit_part_size(size, part_size),
            _ => calc_part_size(size),
        };
        let parallel = match transfer_config.parallel {
            Some(parallel) => parallel.max(1) as usize,
            None => part_parallelism(part_count),
        };

        Self {
            part_size,
            part_count,
            parallel,
        }
    }

    /// The bytes of the 1-based `part_number`. The last part holds the remainder.
    pub fn range_of(&self, part_number: i32, size: u64) -> ByteRange {
        let offset = (part_number as u64 - 1) * self.part_size;
        ByteRange::new(offset, self.part_size.min(size - offset))
    }
}

/// A part size aiming at between 20 and 1000 parts, with parts between 1MiB and 500MiB
/// where the size allows it.
pub fn calc_part_size(size: u64) -> (u64, u64) {
    let mut part_size = size.div_ceil(MAX_PART_NUM).max(MIN_PART_SIZE);
    let mut part_count = part_count_of(size, part_size);

    while part_count > MAX_IDEAL_PART_NUM && part_size < MAX_IDEAL_PART_SIZE {
        part_count /= 5;
        part_size = size.div_ceil(part_count);
    }

    while part_size < MIN_IDEAL_PART_SIZE && part_count > MIN_IDEAL_PART_NUM {
        part_size *= 5;
        part_count = part_count_of(size, part_size);
    }

    (part_size, part_count)
}

// An explicit part size is raised for objects it would split into too many parts.
fn fit_part_size(size: u64, part_size: u64) -> (u64, u64) {
    let part_count = part_count_of(size, part_size);
    if part_count <= MAX_PART_NUM {
        return (part_size, part_count);
    }

    let fitted_part_size = size.div_ceil(MAX_PART_NUM);
    debug!(
        size = size,
        part_size = part_size,
        fitted_part_size = fitted_part_size,
        "part size raised to stay within the part number limit."
    );
    (fitted_part_size, part_count_of(size, fitted_part_size))
}

pub fn part_parallelism(part_count: u64) -> usize {
    match part_count {
        0..2 => 1,
        2..4 => 2,
        4..=20 => 4,
        21..=300 => 8,
        301..=500 => 10,
        _ => 12,
    }
}

fn part_count_of(size: u64, part_size: u64) -> u64 {
    if size == 0 {
        return 0;
    }
    (size - 1) / part_size + 1
}

impl ObjectTransferrer {
    /// Transfers the parts of a multipart upload that the checkpoint does not already hold,
    /// then completes the upload.
    ///
    /// `transfer_part` receives the upload id, the part number and its byte range and
    /// returns the ETag of the part.
    pub(super) async fn multipart_upload<F, Fut>(
        &self,
        fingerprint: SourceFingerprint,
        bucket: &str,
        key: &str,
        plan: &PartPlan,
        transfer_part: F,
    ) -> Result<()>
    where
        F: Fn(String, i32, ByteRange) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let record = self.resume_upload(fingerprint, bucket, key).await?;
        let upload_id = record
            .upload_id
            .clone()
            .ok_or_else(|| anyhow!("checkpoint without upload id: {key}"))?;
        let size = record.fingerprint.size;
        let session = CheckpointSession::new(self.context.checkpoint_store.clone(), record);

        let missing_parts = session.snapshot().await.missing_parts();
        debug!(
            worker_index = self.worker_index,
            key = key,
            upload_id = upload_id,
            missing_parts = missing_parts.len(),
            part_count = plan.part_count,
            "multipart upload has started."
        );

        let session_ref = &session;
        let transfer_part_ref = &transfer_part;
        let upload_id_ref = &upload_id;
        stream::iter(missing_parts)
            .map(move |part_number| async move {
                self.check_cancelled()?;

                let range = plan.range_of(part_number, size);
                let e_tag = transfer_part_ref(upload_id_ref.clone(), part_number, range).await?;
                session_ref.record_part(part_number, &e_tag).await?;

                trace!(
                    worker_index = self.worker_index,
                    key = key,
                    part_number = part_number,
                    "part has been transferred."
                );
                Ok::<(), anyhow::Error>(())
            })
            .buffer_unordered(plan.parallel)
            .try_collect::<Vec<()>>()
            .await?;

        let parts: Vec<CompletedPart> = session
            .snapshot()
            .await
            .completed_parts
            .into_iter()
            .map(|(part_number, e_tag)| CompletedPart { part_number, e_tag })
            .collect();

        let storage = self.storage()?;
        let upload_id = upload_id.as_str();
        with_force_retry(
            &self.context.config.force_retry_config,
            "complete_multipart_upload",
            key,
            || storage.complete_multipart_upload(bucket, key, upload_id, parts.clone()),
        )
        .await?;
        session.finalize().await?;

        debug!(
            worker_index = self.worker_index,
            key = key,
            upload_id = upload_id,
            "multipart upload has been completed."
        );
        Ok(())
    }

    // A stored record is trusted only if it belongs to the same source and its upload still
    // exists. Parts the service no longer has are transferred again.
    async fn resume_upload(
        &self,
        fingerprint: SourceFingerprint,
        bucket: &str,
        key: &str,
    ) -> Result<CheckpointRecord> {
        let store = &self.context.checkpoint_store;
        let storage = self.storage()?;
        let retry_config = &self.context.config.force_retry_config;

        if let Some(mut record) = store.load(&fingerprint.source, &fingerprint.dest).await {
            match record.upload_id.clone() {
                Some(upload_id) if record.is_valid_for(&fingerprint) => {
                    let upload_id = upload_id.as_str();
                    match with_force_retry(retry_config, "list_parts", key, || {
                        storage.list_parts(bucket, key, upload_id)
                    })
                    .await
                    {
                        Ok(parts) => {
                            record.completed_parts.retain(|part_number, e_tag| {
                                parts.iter().any(|part| {
                                    part.part_number == *part_number && part.e_tag == *e_tag
                                })
                            });
                            let completed_parts = record.completed_parts.len();
                            debug!(
                                key = key,
                                upload_id = upload_id,
                                completed_parts = completed_parts,
                                "multipart upload resumed from checkpoint."
                            );
                            return Ok(record);
                        }
                        Err(e)
                            if matches!(
                                storage_error_of(&e),
                                Some(StorageError::NoSuchUpload(_))
                            ) =>
                        {
                            debug!(
                                key = key,
                                upload_id = upload_id,
                                "checkpoint upload no longer exists."
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
                _ => {
                    debug!(key = key, "checkpoint does not match the source.");
                }
            }
            store
                .remove(&fingerprint.source, &fingerprint.dest)
                .await?;
        }

        let upload_id = with_force_retry(retry_config, "initiate_multipart_upload", key, || {
            storage.initiate_multipart_upload(bucket, key)
        })
        .await?;
        Ok(CheckpointRecord::new(fingerprint, Some(upload_id)))
    }
}
