use anyhow::Result;
use tracing::debug;

use crate::storage::with_force_retry;
use crate::store::checkpoint::SourceFingerprint;
use crate::types::ObjectDescriptor;

use super::multipart::PartPlan;
use super::{ObjectTransferrer, TransferOutcome, object_name};

impl ObjectTransferrer {
    /// Server side copy of one object. Large objects are copied part by part.
    pub(super) async fn copy_object(&self, object: &ObjectDescriptor) -> Result<TransferOutcome> {
        let source = self.source_cloud_url()?;
        let target = self.target_cloud_url()?;
        let source_key = object.full_key();
        let source_url = source.with_object(&source_key).to_string();
        let key = object_name(&target.object, &object.key);
        let target_url = target.with_object(&key).to_string();
        let size = object.size as u64;

        if self.should_skip_copy(object, &target.bucket, &key, &target_url).await {
            debug!(
                worker_index = self.worker_index,
                source = source_url,
                target = target_url,
                "copy skipped."
            );
            return Ok(TransferOutcome::Skipped(object.size));
        }

        let storage = self.storage()?;
        let retry_config = &self.context.config.force_retry_config;
        let (source_bucket, source_key) = (source.bucket.as_str(), source_key.as_str());
        let (bucket, key) = (target.bucket.as_str(), key.as_str());

        if size > 0
            && self
                .context
                .config
                .transfer_config
                .is_multipart_required(size)
        {
            let plan = PartPlan::new(size, &self.context.config.transfer_config);
            let fingerprint = SourceFingerprint {
                source: source_url.clone(),
                dest: target_url.clone(),
                size,
                last_modified: object.last_modified.timestamp(),
                part_size: plan.part_size,
                part_count: plan.part_count,
            };
            self.multipart_upload(
                fingerprint,
                bucket,
                key,
                &plan,
                move |upload_id, part_number, range| async move {
                    let upload_id = upload_id.as_str();
                    with_force_retry(retry_config, "upload_part_copy", key, || {
                        storage.upload_part_copy(
                            source_bucket,
                            source_key,
                            range,
                            bucket,
                            key,
                            upload_id,
                            part_number,
                        )
                    })
                    .await
                },
            )
            .await?;
        } else {
            with_force_retry(retry_config, "copy_object", key, || {
                storage.copy_object(source_bucket, source_key, bucket, key)
            })
            .await?;
        }

        debug!(
            worker_index = self.worker_index,
            source = source_url,
            target = target_url,
            size = size,
            "copy completed."
        );
        Ok(TransferOutcome::File(object.size))
    }

    async fn should_skip_copy(
        &self,
        object: &ObjectDescriptor,
        bucket: &str,
        key: &str,
        target_url: &str,
    ) -> bool {
        let config = &self.context.config;
        if self.is_out_of_time_window(&object.last_modified) {
            return true;
        }

        if config.update {
            return self.head_target(bucket, key).await.is_some_and(|entry| {
                object.last_modified.timestamp() <= entry.last_modified.timestamp()
            });
        }

        if !config.force && self.head_target(bucket, key).await.is_some() {
            return !self.confirm_overwrite(target_url).await;
        }
        false
    }
}
