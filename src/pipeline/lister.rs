use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, trace};

use super::stage::{SendResult, Stage};
use crate::config::{CopyConfig, ForceRetryConfig, RemoveConfig};
use crate::storage::local::LocalFileLister;
use crate::storage::{Storage, with_force_retry};
use crate::types::error::{StorageError, storage_error_of};
use crate::types::storage_url::{CloudUrl, StorageUrl};
use crate::types::{ObjectDescriptor, OperationKind, RemovalItem, TransferItem, UploadDescriptor};

const DELIMITER: &str = "/";

/// Pages through the objects below a prefix.
///
/// A prefix ending with `/` is also the initial marker, so the prefix object itself is
/// never listed. Each object is split into the part of its key up to the last `/` of the
/// prefix and the relative key after it.
pub struct CloudObjectPager<'a> {
    storage: &'a Storage,
    bucket: String,
    split_index: Option<usize>,
    prefix: String,
    marker: String,
    delimiter: Option<&'static str>,
    max_keys: i32,
    force_retry_config: ForceRetryConfig,
    finished: bool,
}

impl<'a> CloudObjectPager<'a> {
    pub fn new(
        storage: &'a Storage,
        cloud_url: &CloudUrl,
        only_current_dir: bool,
        max_keys: i32,
        force_retry_config: ForceRetryConfig,
    ) -> Self {
        let marker = if cloud_url.object.ends_with('/') {
            cloud_url.object.clone()
        } else {
            String::new()
        };

        Self {
            storage,
            bucket: cloud_url.bucket.clone(),
            split_index: cloud_url.object.rfind('/'),
            prefix: cloud_url.object.clone(),
            marker,
            delimiter: only_current_dir.then_some(DELIMITER),
            max_keys,
            force_retry_config,
            finished: false,
        }
    }

    /// Lists from the very first key below the prefix and keeps keys whole.
    pub fn with_full_keys(mut self) -> Self {
        self.split_index = None;
        self.marker = String::new();
        self
    }

    /// `None` once every page has been returned.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ObjectDescriptor>>> {
        if self.finished {
            return Ok(None);
        }

        let storage = self.storage;
        let (bucket, prefix, marker) = (
            self.bucket.as_str(),
            self.prefix.as_str(),
            self.marker.as_str(),
        );
        let (delimiter, max_keys) = (self.delimiter, self.max_keys);
        let output = with_force_retry(&self.force_retry_config, "list_objects", prefix, || {
            storage.list_objects(bucket, prefix, marker, delimiter, max_keys)
        })
        .await
        .with_context(|| format!("list_objects() failed. bucket: {bucket}, prefix: {prefix}"))?;

        let objects = output
            .objects
            .iter()
            .map(|entry| {
                let (prefix, key) = split_key(&entry.key, self.split_index);
                ObjectDescriptor {
                    prefix: prefix.to_string(),
                    key: key.to_string(),
                    size: entry.size,
                    last_modified: entry.last_modified,
                }
            })
            .collect();

        self.marker = output.next_marker;
        self.finished = !output.is_truncated;
        Ok(Some(objects))
    }
}

fn split_key(key: &str, split_index: Option<usize>) -> (&str, &str) {
    match split_index {
        Some(index) if index < key.len() => key.split_at(index + 1),
        _ => ("", key),
    }
}

/// Pages through the multipart uploads below a prefix. With `exact_key`, only the uploads of
/// that very key are returned.
pub struct UploadPager<'a> {
    storage: &'a Storage,
    bucket: String,
    prefix: String,
    exact_key: bool,
    key_marker: String,
    upload_id_marker: String,
    max_uploads: i32,
    force_retry_config: ForceRetryConfig,
    finished: bool,
}

impl<'a> UploadPager<'a> {
    pub fn new(
        storage: &'a Storage,
        cloud_url: &CloudUrl,
        exact_key: bool,
        max_uploads: i32,
        force_retry_config: ForceRetryConfig,
    ) -> Self {
        Self {
            storage,
            bucket: cloud_url.bucket.clone(),
            prefix: cloud_url.object.clone(),
            exact_key,
            key_marker: String::new(),
            upload_id_marker: String::new(),
            max_uploads,
            force_retry_config,
            finished: false,
        }
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<UploadDescriptor>>> {
        if self.finished {
            return Ok(None);
        }

        let storage = self.storage;
        let (bucket, prefix, key_marker, upload_id_marker) = (
            self.bucket.as_str(),
            self.prefix.as_str(),
            self.key_marker.as_str(),
            self.upload_id_marker.as_str(),
        );
        let max_uploads = self.max_uploads;
        let output = with_force_retry(
            &self.force_retry_config,
            "list_multipart_uploads",
            prefix,
            || {
                storage.list_multipart_uploads(
                    bucket,
                    prefix,
                    key_marker,
                    upload_id_marker,
                    max_uploads,
                )
            },
        )
        .await
        .with_context(|| {
            format!("list_multipart_uploads() failed. bucket: {bucket}, prefix: {prefix}")
        })?;

        let uploads = output
            .uploads
            .into_iter()
            .filter(|upload| !self.exact_key || upload.key == self.prefix)
            .collect();

        self.key_marker = output.next_key_marker;
        self.upload_id_marker = output.next_upload_id_marker;
        self.finished = !output.is_truncated;
        Ok(Some(uploads))
    }
}

/// The descriptor of a single source object, `None` when it does not exist.
pub async fn head_single_object(
    storage: &Storage,
    cloud_url: &CloudUrl,
    force_retry_config: &ForceRetryConfig,
) -> Result<Option<ObjectDescriptor>> {
    let (bucket, key) = (cloud_url.bucket.as_str(), cloud_url.object.as_str());
    let result = with_force_retry(force_retry_config, "head_object", key, || {
        storage.head_object(bucket, key)
    })
    .await;

    match result {
        Ok(entry) => {
            let (prefix, key) = split_key(&entry.key, cloud_url.object.rfind('/'));
            Ok(Some(ObjectDescriptor {
                prefix: prefix.to_string(),
                key: key.to_string(),
                size: entry.size,
                last_modified: entry.last_modified,
            }))
        }
        Err(e) if matches!(storage_error_of(&e), Some(StorageError::NoSuchKey(_))) => Ok(None),
        Err(e) => Err(e.context(format!("head_object() failed. key: {key}"))),
    }
}

/// Produces the items a copy batch works on.
pub struct TransferSourceLister {
    base: Stage<TransferItem>,
    config: CopyConfig,
    max_keys: i32,
}

impl TransferSourceLister {
    pub fn new(base: Stage<TransferItem>, config: CopyConfig, max_keys: i32) -> Self {
        Self {
            base,
            config,
            max_keys,
        }
    }

    pub async fn list_source(&self) -> Result<()> {
        trace!("list source has started.");

        match &self.config.source {
            StorageUrl::File(file_url) => {
                let Some(sender) = self.base.sender.as_ref() else {
                    return Ok(());
                };
                LocalFileLister::new(
                    Path::new(&file_url.path),
                    self.config.follow_symlinks,
                    self.config.only_current_dir,
                    Some(&self.config.checkpoint_dir),
                    self.base.cancellation_token.clone(),
                )
                .list(sender)
                .await?;
            }
            StorageUrl::Cloud(cloud_url) => {
                if self.config.recursive {
                    self.list_cloud_objects(cloud_url).await?;
                } else {
                    self.send_single_object(cloud_url).await?;
                }
            }
        }

        trace!("list source has been completed.");
        Ok(())
    }

    async fn list_cloud_objects(&self, cloud_url: &CloudUrl) -> Result<()> {
        let mut pager = CloudObjectPager::new(
            self.base.storage()?,
            cloud_url,
            self.config.only_current_dir,
            self.max_keys,
            self.config.force_retry_config,
        );

        while let Some(objects) = pager.next_page().await? {
            for object in objects {
                if self.base.cancellation_token.is_cancelled() {
                    debug!("list source has been cancelled.");
                    return Ok(());
                }
                if self.base.send(object.into()).await? == SendResult::Closed {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn send_single_object(&self, cloud_url: &CloudUrl) -> Result<()> {
        let object = head_single_object(
            self.base.storage()?,
            cloud_url,
            &self.config.force_retry_config,
        )
        .await?
        .ok_or_else(|| {
            anyhow::Error::new(StorageError::NoSuchKey(cloud_url.object.clone()))
                .context(format!("source object not found: {cloud_url}"))
        })?;

        self.base.send(object.into()).await?;
        Ok(())
    }
}

/// Produces the objects and multipart uploads a removal batch deletes.
pub struct RemovalLister {
    base: Stage<RemovalItem>,
    config: RemoveConfig,
    max_keys: i32,
}

impl RemovalLister {
    pub fn new(base: Stage<RemovalItem>, config: RemoveConfig, max_keys: i32) -> Self {
        Self {
            base,
            config,
            max_keys,
        }
    }

    pub async fn list_target(&self) -> Result<()> {
        trace!("list removal target has started.");

        let kind = self.config.operation_kind();
        if kind.contains(OperationKind::OBJECT) {
            if self.config.recursive {
                self.list_objects().await?;
            } else {
                self.send_single_object().await?;
            }
        }
        if kind.contains(OperationKind::MULTIPART_UPLOAD) {
            self.list_uploads().await?;
        }

        trace!("list removal target has been completed.");
        Ok(())
    }

    async fn list_objects(&self) -> Result<()> {
        let mut pager = CloudObjectPager::new(
            self.base.storage()?,
            &self.config.target,
            false,
            self.max_keys,
            self.config.force_retry_config,
        )
        .with_full_keys();

        while let Some(objects) = pager.next_page().await? {
            for object in objects {
                if self.base.cancellation_token.is_cancelled() {
                    debug!("list removal target has been cancelled.");
                    return Ok(());
                }
                if self.base.send(object.into()).await? == SendResult::Closed {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn send_single_object(&self) -> Result<()> {
        let object = head_single_object(
            self.base.storage()?,
            &self.config.target,
            &self.config.force_retry_config,
        )
        .await?;

        match object {
            Some(object) => {
                self.base.send(object.into()).await?;
            }
            None => {
                let key = self.config.target.object.as_str();
                debug!(key = key, "object to remove does not exist.");
            }
        }
        Ok(())
    }

    async fn list_uploads(&self) -> Result<()> {
        let mut pager = UploadPager::new(
            self.base.storage()?,
            &self.config.target,
            !self.config.recursive,
            self.max_keys,
            self.config.force_retry_config,
        );

        while let Some(uploads) = pager.next_page().await? {
            for upload in uploads {
                if self.base.cancellation_token.is_cancelled() {
                    debug!("list removal target has been cancelled.");
                    return Ok(());
                }
                if self.base.send(upload.into()).await? == SendResult::Closed {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}
