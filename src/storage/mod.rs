use std::future::Future;
use std::time::Duration;

use anyhow::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dyn_clone::DynClone;
use tracing::warn;

use crate::config::ForceRetryConfig;
use crate::types::UploadDescriptor;
use crate::types::error::{OssbulkError, storage_error_of};

pub mod fs_bucket;
pub mod local;

pub type Storage = Box<dyn StorageTrait + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListObjectsOutput {
    pub prefix: String,
    pub objects: Vec<ObjectEntry>,
    pub common_prefixes: Vec<String>,
    pub next_marker: String,
    pub is_truncated: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListMultipartUploadsOutput {
    pub uploads: Vec<UploadDescriptor>,
    pub next_key_marker: String,
    pub next_upload_id_marker: String,
    pub is_truncated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartEntry {
    pub part_number: i32,
    pub e_tag: String,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub e_tag: String,
}

/// The object service surface the copy and removal engines talk to.
///
/// Every error that comes from the service itself carries a
/// [`StorageError`](crate::types::error::StorageError) in its chain.
#[async_trait]
pub trait StorageTrait: DynClone {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: Option<&str>,
        max_keys: i32,
    ) -> Result<ListObjectsOutput>;
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectEntry>;
    async fn get_object(&self, bucket: &str, key: &str, range: Option<ByteRange>)
    -> Result<Vec<u8>>;
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<String>;
    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
    ) -> Result<String>;
    async fn initiate_multipart_upload(&self, bucket: &str, key: &str) -> Result<String>;
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String>;
    #[allow(clippy::too_many_arguments)]
    async fn upload_part_copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        range: ByteRange,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
    ) -> Result<String>;
    async fn list_parts(&self, bucket: &str, key: &str, upload_id: &str) -> Result<Vec<PartEntry>>;
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<String>;
    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str)
    -> Result<()>;
    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        upload_id_marker: &str,
        max_uploads: i32,
    ) -> Result<ListMultipartUploadsOutput>;
    async fn delete_object(&self, bucket: &str, key: &str, all_versions: bool) -> Result<()>;
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
}

/// A resolved byte range of an object: `length` bytes starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    pub fn full(size: u64) -> Self {
        Self {
            offset: 0,
            length: size,
        }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    pub fn is_full(&self, size: u64) -> bool {
        self.offset == 0 && self.length == size
    }
}

/// Resolves a `--range` expression (`a-b`, `a-`, `-n`) against an object of `size` bytes.
///
/// Only the first of several comma separated ranges is used. A malformed or out of bounds
/// expression falls back to the whole object. An explicit zero length suffix (`-0`) is an error.
pub fn resolve_range(range: &str, size: u64) -> Result<ByteRange> {
    let range = range.split(',').next().unwrap_or_default().trim();

    if let Some(length) = range.strip_prefix('-') {
        let Ok(length) = length.parse::<u64>() else {
            return Ok(ByteRange::full(size));
        };
        if length == 0 {
            return Err(OssbulkError::ZeroLengthRange(range.to_string()).into());
        }
        if size <= length {
            return Ok(ByteRange::full(size));
        }
        return Ok(ByteRange::new(size - length, length));
    }

    if let Some(start) = range.strip_suffix('-') {
        return match start.parse::<u64>() {
            Ok(start) if start < size => Ok(ByteRange::new(start, size - start)),
            _ => Ok(ByteRange::full(size)),
        };
    }

    let Some((start, end)) = range.split_once('-') else {
        return Ok(ByteRange::full(size));
    };
    match (start.parse::<u64>(), end.parse::<u64>()) {
        (Ok(start), Ok(end)) if start < size && end < size && start <= end => {
            Ok(ByteRange::new(start, end - start + 1))
        }
        _ => Ok(ByteRange::full(size)),
    }
}

pub fn is_force_retryable_error(e: &Error) -> bool {
    storage_error_of(e).is_some_and(|e| e.is_retryable())
}

/// Runs `operation` until it succeeds, fails with a non retryable error, or the retry budget
/// is used up. Client side (4xx) errors are returned immediately.
pub async fn with_force_retry<T, F, Fut>(
    force_retry_config: &ForceRetryConfig,
    name: &str,
    key: &str,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry_count = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !is_force_retryable_error(&e)
                    || force_retry_config.force_retry_count <= retry_count
                {
                    return Err(e);
                }
                retry_count += 1;

                let error = e.to_string();
                warn!(
                    name = name,
                    key = key,
                    retry_count = retry_count,
                    error = error,
                    "force retryable error has occurred."
                );

                tokio::time::sleep(Duration::from_millis(
                    force_retry_config.force_retry_interval_milliseconds,
                ))
                .await;
            }
        }
    }
}
