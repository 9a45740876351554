//! An object service kept in a local directory tree.
//!
//! ```text
//! <root>/<bucket>/objects/<percent-encoded key>
//! <root>/<bucket>/uploads/<upload id>/upload.json
//! <root>/<bucket>/uploads/<upload id>/<part number>
//! <root>/<bucket>/tmp/
//! ```
//!
//! Writes go through a temporary file in `tmp/` and are renamed into place, so a reader
//! never sees a half written object or part.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::storage::{
    ByteRange, CompletedPart, ListMultipartUploadsOutput, ListObjectsOutput, ObjectEntry,
    PartEntry, Storage, StorageTrait,
};
use crate::types::error::StorageError;
use crate::types::{UploadDescriptor, sha1_hex};

const OBJECTS_DIR: &str = "objects";
const UPLOADS_DIR: &str = "uploads";
const TEMP_DIR: &str = "tmp";
const MANIFEST_FILE: &str = "upload.json";
const MAX_PART_NUMBER: i32 = 10000;

static UPLOAD_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UploadManifest {
    key: String,
    upload_id: String,
    initiated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FsBucketStorage {
    root: PathBuf,
}

impl FsBucketStorage {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn boxed(root: &Path) -> Storage {
        Box::new(Self::new(root))
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let bucket_path = self.bucket_path(bucket)?;
        for dir in [OBJECTS_DIR, UPLOADS_DIR, TEMP_DIR] {
            tokio::fs::create_dir_all(bucket_path.join(dir))
                .await
                .map_err(StorageError::from)
                .with_context(|| format!("failed to create bucket: {bucket}"))?;
        }

        debug!(bucket = bucket, "bucket created.");
        Ok(())
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty()
            || bucket == "."
            || bucket == ".."
            || bucket.contains('/')
            || bucket.contains('\\')
        {
            return Err(StorageError::InvalidBucketName(bucket.to_string()).into());
        }
        Ok(self.root.join(bucket))
    }

    async fn existing_bucket_path(&self, bucket: &str) -> Result<PathBuf> {
        let bucket_path = self.bucket_path(bucket)?;
        if !tokio::fs::try_exists(bucket_path.join(OBJECTS_DIR))
            .await
            .map_err(StorageError::from)?
        {
            return Err(StorageError::NoSuchBucket(bucket.to_string()).into());
        }
        Ok(bucket_path)
    }

    async fn session_path(&self, bucket_path: &Path, key: &str, upload_id: &str) -> Result<PathBuf> {
        if upload_id.is_empty() || !upload_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StorageError::NoSuchUpload(upload_id.to_string()).into());
        }

        let session_path = bucket_path.join(UPLOADS_DIR).join(upload_id);
        let manifest = read_manifest(&session_path)
            .await
            .map_err(|_| StorageError::NoSuchUpload(upload_id.to_string()))?;
        if manifest.key != key {
            return Err(StorageError::NoSuchUpload(upload_id.to_string()).into());
        }

        Ok(session_path)
    }

    async fn sorted_keys(&self, bucket_path: &Path) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(bucket_path.join(OBJECTS_DIR))
            .await
            .map_err(StorageError::from)?;

        let mut keys = vec![];
        while let Some(entry) = entries.next_entry().await.map_err(StorageError::from)? {
            let file_name = entry.file_name();
            if let Ok(key) = percent_decode_str(&file_name.to_string_lossy()).decode_utf8() {
                keys.push(key.into_owned());
            }
        }
        keys.sort();

        Ok(keys)
    }
}

#[async_trait]
impl StorageTrait for FsBucketStorage {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let bucket_path = self.bucket_path(bucket)?;
        Ok(tokio::fs::try_exists(bucket_path.join(OBJECTS_DIR))
            .await
            .map_err(StorageError::from)?)
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: Option<&str>,
        max_keys: i32,
    ) -> Result<ListObjectsOutput> {
        let bucket_path = self.existing_bucket_path(bucket).await?;
        let keys = self.sorted_keys(&bucket_path).await?;
        let max_keys = max_keys.max(1) as usize;

        let mut output = ListObjectsOutput {
            prefix: prefix.to_string(),
            ..Default::default()
        };
        let mut count = 0;
        for key in keys.iter().filter(|key| key.starts_with(prefix)) {
            let common_prefix = rolled_up_prefix(key, prefix, delimiter);
            let name = common_prefix.as_deref().unwrap_or(key);
            if name <= marker {
                continue;
            }

            if let Some(common_prefix) = common_prefix {
                if output.common_prefixes.last() == Some(&common_prefix) {
                    continue;
                }
                if count == max_keys {
                    output.is_truncated = true;
                    break;
                }
                output.next_marker = common_prefix.clone();
                output.common_prefixes.push(common_prefix);
            } else {
                if count == max_keys {
                    output.is_truncated = true;
                    break;
                }
                let metadata = tokio::fs::metadata(object_path(&bucket_path, key))
                    .await
                    .map_err(StorageError::from)?;
                output.objects.push(ObjectEntry {
                    key: key.to_string(),
                    size: metadata.len() as i64,
                    last_modified: DateTime::<Utc>::from(
                        metadata.modified().map_err(StorageError::from)?,
                    ),
                });
                output.next_marker = key.to_string();
            }
            count += 1;
        }

        if !output.is_truncated {
            output.next_marker = String::new();
        }

        trace!(
            bucket = bucket,
            prefix = prefix,
            marker = marker,
            objects = output.objects.len(),
            is_truncated = output.is_truncated,
            "list_objects() completed."
        );
        Ok(output)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectEntry> {
        let bucket_path = self.existing_bucket_path(bucket).await?;
        let metadata = tokio::fs::metadata(object_path(&bucket_path, key))
            .await
            .map_err(|e| not_found_as(e, StorageError::NoSuchKey(key.to_string())))?;

        Ok(ObjectEntry {
            key: key.to_string(),
            size: metadata.len() as i64,
            last_modified: DateTime::<Utc>::from(metadata.modified().map_err(StorageError::from)?),
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Vec<u8>> {
        let bucket_path = self.existing_bucket_path(bucket).await?;
        let path = object_path(&bucket_path, key);
        read_object(path, key, range).await
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<String> {
        let bucket_path = self.existing_bucket_path(bucket).await?;
        check_key(key)?;

        let e_tag = generate_e_tag(&body);
        write_atomically(&bucket_path, object_path(&bucket_path, key), body).await?;

        trace!(bucket = bucket, key = key, e_tag = e_tag, "put_object() completed.");
        Ok(e_tag)
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
    ) -> Result<String> {
        let source_bucket_path = self.existing_bucket_path(source_bucket).await?;
        let bucket_path = self.existing_bucket_path(bucket).await?;
        check_key(key)?;

        let body = read_object(object_path(&source_bucket_path, source_key), source_key, None).await?;
        let e_tag = generate_e_tag(&body);
        write_atomically(&bucket_path, object_path(&bucket_path, key), body).await?;

        Ok(e_tag)
    }

    async fn initiate_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let bucket_path = self.existing_bucket_path(bucket).await?;
        check_key(key)?;

        let upload_id = generate_upload_id(bucket, key);
        let session_path = bucket_path.join(UPLOADS_DIR).join(&upload_id);
        tokio::fs::create_dir_all(&session_path)
            .await
            .map_err(StorageError::from)?;

        let manifest = UploadManifest {
            key: key.to_string(),
            upload_id: upload_id.clone(),
            initiated: Utc::now(),
        };
        let body = serde_json::to_vec(&manifest).context("serde_json::to_vec() failed.")?;
        write_atomically(&bucket_path, session_path.join(MANIFEST_FILE), body).await?;

        debug!(bucket = bucket, key = key, upload_id = upload_id, "multipart upload initiated.");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String> {
        let bucket_path = self.existing_bucket_path(bucket).await?;
        let session_path = self.session_path(&bucket_path, key, upload_id).await?;
        check_part_number(part_number)?;

        let e_tag = generate_e_tag(&body);
        write_atomically(&bucket_path, part_path(&session_path, part_number), body).await?;

        trace!(
            key = key,
            upload_id = upload_id,
            part_number = part_number,
            "upload_part() completed."
        );
        Ok(e_tag)
    }

    async fn upload_part_copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        range: ByteRange,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
    ) -> Result<String> {
        let source_bucket_path = self.existing_bucket_path(source_bucket).await?;
        let body = read_object(
            object_path(&source_bucket_path, source_key),
            source_key,
            Some(range),
        )
        .await?;

        self.upload_part(bucket, key, upload_id, part_number, body)
            .await
    }

    async fn list_parts(&self, bucket: &str, key: &str, upload_id: &str) -> Result<Vec<PartEntry>> {
        let bucket_path = self.existing_bucket_path(bucket).await?;
        let session_path = self.session_path(&bucket_path, key, upload_id).await?;

        let mut entries = tokio::fs::read_dir(&session_path)
            .await
            .map_err(StorageError::from)?;
        let mut parts = vec![];
        while let Some(entry) = entries.next_entry().await.map_err(StorageError::from)? {
            let Ok(part_number) = entry.file_name().to_string_lossy().parse::<i32>() else {
                continue;
            };
            let body = tokio::fs::read(entry.path())
                .await
                .map_err(StorageError::from)?;
            parts.push(PartEntry {
                part_number,
                e_tag: generate_e_tag(&body),
                size: body.len() as i64,
            });
        }
        parts.sort_by_key(|part| part.part_number);

        Ok(parts)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<String> {
        let bucket_path = self.existing_bucket_path(bucket).await?;
        let session_path = self.session_path(&bucket_path, key, upload_id).await?;
        if parts.is_empty() {
            return Err(StorageError::InvalidPart(upload_id.to_string()).into());
        }

        let uploaded = self.list_parts(bucket, key, upload_id).await?;
        let mut concatenated_digests = vec![];
        let mut previous_part_number = 0;
        for part in &parts {
            let found = uploaded
                .iter()
                .find(|uploaded| uploaded.part_number == part.part_number);
            if part.part_number <= previous_part_number
                || found.is_none_or(|uploaded| uploaded.e_tag != part.e_tag)
            {
                return Err(StorageError::InvalidPart(format!(
                    "{upload_id}: part {}",
                    part.part_number
                ))
                .into());
            }
            previous_part_number = part.part_number;
            concatenated_digests
                .extend_from_slice(&hex::decode(&part.e_tag).context("hex::decode() failed.")?);
        }

        let part_paths: Vec<PathBuf> = parts
            .iter()
            .map(|part| part_path(&session_path, part.part_number))
            .collect();
        let temp_dir = bucket_path.join(TEMP_DIR);
        let destination = object_path(&bucket_path, key);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut temp_file = NamedTempFile::new_in(temp_dir).map_err(StorageError::from)?;
            for part_path in part_paths {
                let mut part_file = std::fs::File::open(part_path).map_err(StorageError::from)?;
                std::io::copy(&mut part_file, &mut temp_file).map_err(StorageError::from)?;
            }
            temp_file
                .persist(destination)
                .map_err(|e| StorageError::from(e.error))?;
            Ok(())
        })
        .await
        .context("spawn_blocking() failed.")??;

        tokio::fs::remove_dir_all(&session_path)
            .await
            .map_err(StorageError::from)?;

        let e_tag = generate_multipart_e_tag(&concatenated_digests, parts.len());
        debug!(
            bucket = bucket,
            key = key,
            upload_id = upload_id,
            e_tag = e_tag,
            "multipart upload completed."
        );
        Ok(e_tag)
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        let bucket_path = self.existing_bucket_path(bucket).await?;
        let session_path = self.session_path(&bucket_path, key, upload_id).await?;

        tokio::fs::remove_dir_all(&session_path)
            .await
            .map_err(|e| not_found_as(e, StorageError::NoSuchUpload(upload_id.to_string())))?;

        debug!(bucket = bucket, key = key, upload_id = upload_id, "multipart upload aborted.");
        Ok(())
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        upload_id_marker: &str,
        max_uploads: i32,
    ) -> Result<ListMultipartUploadsOutput> {
        let bucket_path = self.existing_bucket_path(bucket).await?;
        let mut entries = tokio::fs::read_dir(bucket_path.join(UPLOADS_DIR))
            .await
            .map_err(StorageError::from)?;

        let mut uploads = vec![];
        while let Some(entry) = entries.next_entry().await.map_err(StorageError::from)? {
            let Ok(manifest) = read_manifest(&entry.path()).await else {
                continue;
            };
            if manifest.key.starts_with(prefix) {
                uploads.push(UploadDescriptor {
                    key: manifest.key,
                    upload_id: manifest.upload_id,
                    initiated: manifest.initiated,
                });
            }
        }
        uploads.sort_by(|a, b| (&a.key, &a.upload_id).cmp(&(&b.key, &b.upload_id)));

        let mut uploads: Vec<UploadDescriptor> = uploads
            .into_iter()
            .filter(|upload| {
                key_marker.is_empty()
                    || key_marker < upload.key.as_str()
                    || (key_marker == upload.key
                        && !upload_id_marker.is_empty()
                        && upload_id_marker < upload.upload_id.as_str())
            })
            .collect();

        let max_uploads = max_uploads.max(1) as usize;
        let mut output = ListMultipartUploadsOutput::default();
        if max_uploads < uploads.len() {
            uploads.truncate(max_uploads);
            output.is_truncated = true;
            if let Some(last) = uploads.last() {
                output.next_key_marker = last.key.clone();
                output.next_upload_id_marker = last.upload_id.clone();
            }
        }
        output.uploads = uploads;

        Ok(output)
    }

    async fn delete_object(&self, bucket: &str, key: &str, all_versions: bool) -> Result<()> {
        let bucket_path = self.existing_bucket_path(bucket).await?;
        check_key(key)?;

        match tokio::fs::remove_file(object_path(&bucket_path, key)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::from(e).into()),
        }

        trace!(
            bucket = bucket,
            key = key,
            all_versions = all_versions,
            "delete_object() completed."
        );
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let bucket_path = self.existing_bucket_path(bucket).await?;

        for dir in [OBJECTS_DIR, UPLOADS_DIR] {
            let mut entries = tokio::fs::read_dir(bucket_path.join(dir))
                .await
                .map_err(StorageError::from)?;
            if entries
                .next_entry()
                .await
                .map_err(StorageError::from)?
                .is_some()
            {
                return Err(StorageError::BucketNotEmpty(bucket.to_string()).into());
            }
        }

        tokio::fs::remove_dir_all(&bucket_path)
            .await
            .map_err(StorageError::from)?;

        debug!(bucket = bucket, "bucket deleted.");
        Ok(())
    }
}

fn object_path(bucket_path: &Path, key: &str) -> PathBuf {
    bucket_path
        .join(OBJECTS_DIR)
        .join(utf8_percent_encode(key, NON_ALPHANUMERIC).to_string())
}

fn part_path(session_path: &Path, part_number: i32) -> PathBuf {
    session_path.join(format!("{part_number:05}"))
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StorageError::NoSuchKey("object name must not be empty".to_string()).into());
    }
    Ok(())
}

fn check_part_number(part_number: i32) -> Result<()> {
    if !(1..=MAX_PART_NUMBER).contains(&part_number) {
        return Err(StorageError::InvalidPart(format!("part number {part_number}")).into());
    }
    Ok(())
}

/// The common prefix `key` is rolled up into when listing with a delimiter.
fn rolled_up_prefix(key: &str, prefix: &str, delimiter: Option<&str>) -> Option<String> {
    let delimiter = delimiter.filter(|delimiter| !delimiter.is_empty())?;
    let rest = &key[prefix.len()..];
    rest.find(delimiter)
        .map(|index| format!("{prefix}{}", &rest[..index + delimiter.len()]))
}

fn not_found_as(e: std::io::Error, not_found: StorageError) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        return not_found;
    }
    StorageError::from(e)
}

fn generate_e_tag(body: &[u8]) -> String {
    hex::encode(md5::compute(body).as_slice())
}

fn generate_multipart_e_tag(concatenated_digests: &[u8], parts_count: usize) -> String {
    format!(
        "{}-{}",
        hex::encode(md5::compute(concatenated_digests).as_slice()),
        parts_count
    )
}

fn generate_upload_id(bucket: &str, key: &str) -> String {
    let sequence = UPLOAD_SEQUENCE.fetch_add(1, Ordering::SeqCst);
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    sha1_hex(&format!(
        "{bucket}/{key}/{nanos}/{sequence}/{}",
        std::process::id()
    ))
    .to_uppercase()
}

async fn read_manifest(session_path: &Path) -> Result<UploadManifest> {
    let body = tokio::fs::read(session_path.join(MANIFEST_FILE))
        .await
        .map_err(StorageError::from)?;
    serde_json::from_slice(&body).context("serde_json::from_slice() failed.")
}

async fn read_object(path: PathBuf, key: &str, range: Option<ByteRange>) -> Result<Vec<u8>> {
    let key = key.to_string();
    tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let mut file = std::fs::File::open(&path).map_err(|e| not_found_as(e, StorageError::NoSuchKey(key)))?;

        let mut body = vec![];
        match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.offset))
                    .map_err(StorageError::from)?;
                file.take(range.length)
                    .read_to_end(&mut body)
                    .map_err(StorageError::from)?;
            }
            None => {
                file.read_to_end(&mut body).map_err(StorageError::from)?;
            }
        }
        Ok(body)
    })
    .await
    .context("spawn_blocking() failed.")?
}

async fn write_atomically(bucket_path: &Path, destination: PathBuf, body: Vec<u8>) -> Result<()> {
    let temp_dir = bucket_path.join(TEMP_DIR);
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut temp_file = NamedTempFile::new_in(temp_dir).map_err(StorageError::from)?;
        temp_file.write_all(&body).map_err(StorageError::from)?;
        temp_file
            .persist(destination)
            .map_err(|e| StorageError::from(e.error))?;
        Ok(())
    })
    .await
    .context("spawn_blocking() failed.")?
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::types::error::storage_error_of;

    use super::*;

    const TEST_BUCKET: &str = "test-bucket";

    async fn create_storage() -> (TempDir, FsBucketStorage) {
        let root = TempDir::new().unwrap();
        let storage = FsBucketStorage::new(root.path());
        storage.create_bucket(TEST_BUCKET).await.unwrap();
        (root, storage)
    }

    fn error_code(e: &anyhow::Error) -> &'static str {
        storage_error_of(e).unwrap().code()
    }

    #[tokio::test]
    async fn put_and_get_object() {
        init_dummy_tracing_subscriber();
        let (_root, storage) = create_storage().await;

        let e_tag = storage
            .put_object(TEST_BUCKET, "dir1/a.txt", b"abcdef".to_vec())
            .await
            .unwrap();
        assert_eq!(e_tag, "e80b5017098950fc58aad83c8c14978e");

        let body = storage
            .get_object(TEST_BUCKET, "dir1/a.txt", None)
            .await
            .unwrap();
        assert_eq!(body, b"abcdef");

        let body = storage
            .get_object(TEST_BUCKET, "dir1/a.txt", Some(ByteRange::new(1, 2)))
            .await
            .unwrap();
        assert_eq!(body, b"bc");

        let head = storage.head_object(TEST_BUCKET, "dir1/a.txt").await.unwrap();
        assert_eq!(head.size, 6);
    }

    #[tokio::test]
    async fn missing_object_and_bucket() {
        init_dummy_tracing_subscriber();
        let (_root, storage) = create_storage().await;

        let e = storage.head_object(TEST_BUCKET, "no-such").await.unwrap_err();
        assert_eq!(error_code(&e), "NoSuchKey");

        let e = storage
            .get_object("no-such-bucket", "key", None)
            .await
            .unwrap_err();
        assert_eq!(error_code(&e), "NoSuchBucket");

        let e = storage.bucket_exists("a/b").await.unwrap_err();
        assert_eq!(error_code(&e), "InvalidBucketName");

        assert!(storage.bucket_exists(TEST_BUCKET).await.unwrap());
        assert!(!storage.bucket_exists("no-such-bucket").await.unwrap());
    }

    #[tokio::test]
    async fn list_objects_paged() {
        init_dummy_tracing_subscriber();
        let (_root, storage) = create_storage().await;

        for key in ["a/1", "a/2", "a/3", "b/1", "c"] {
            storage
                .put_object(TEST_BUCKET, key, vec![])
                .await
                .unwrap();
        }

        let first = storage
            .list_objects(TEST_BUCKET, "", "", None, 2)
            .await
            .unwrap();
        assert_eq!(keys_of(&first), vec!["a/1", "a/2"]);
        assert!(first.is_truncated);
        assert_eq!(first.next_marker, "a/2");

        let second = storage
            .list_objects(TEST_BUCKET, "", &first.next_marker, None, 2)
            .await
            .unwrap();
        assert_eq!(keys_of(&second), vec!["a/3", "b/1"]);

        let third = storage
            .list_objects(TEST_BUCKET, "", &second.next_marker, None, 2)
            .await
            .unwrap();
        assert_eq!(keys_of(&third), vec!["c"]);
        assert!(!third.is_truncated);
        assert_eq!(third.next_marker, "");

        let prefixed = storage
            .list_objects(TEST_BUCKET, "a/", "a/", None, 1000)
            .await
            .unwrap();
        assert_eq!(keys_of(&prefixed), vec!["a/1", "a/2", "a/3"]);
    }

    #[tokio::test]
    async fn list_objects_with_delimiter() {
        init_dummy_tracing_subscriber();
        let (_root, storage) = create_storage().await;

        for key in ["top.txt", "a/1", "a/2", "b/c/1", "z"] {
            storage
                .put_object(TEST_BUCKET, key, vec![])
                .await
                .unwrap();
        }

        let output = storage
            .list_objects(TEST_BUCKET, "", "", Some("/"), 1000)
            .await
            .unwrap();
        assert_eq!(keys_of(&output), vec!["top.txt", "z"]);
        assert_eq!(output.common_prefixes, vec!["a/", "b/"]);

        let page = storage
            .list_objects(TEST_BUCKET, "", "", Some("/"), 1)
            .await
            .unwrap();
        assert_eq!(page.common_prefixes, vec!["a/"]);
        let page = storage
            .list_objects(TEST_BUCKET, "", &page.next_marker, Some("/"), 1)
            .await
            .unwrap();
        assert_eq!(page.common_prefixes, vec!["b/"]);
    }

    #[tokio::test]
    async fn copy_object() {
        init_dummy_tracing_subscriber();
        let (_root, storage) = create_storage().await;
        storage.create_bucket("other-bucket").await.unwrap();

        storage
            .put_object(TEST_BUCKET, "src", b"data".to_vec())
            .await
            .unwrap();
        storage
            .copy_object(TEST_BUCKET, "src", "other-bucket", "dst")
            .await
            .unwrap();

        let body = storage.get_object("other-bucket", "dst", None).await.unwrap();
        assert_eq!(body, b"data");
    }

    #[tokio::test]
    async fn multipart_upload() {
        init_dummy_tracing_subscriber();
        let (_root, storage) = create_storage().await;

        let upload_id = storage
            .initiate_multipart_upload(TEST_BUCKET, "large")
            .await
            .unwrap();
        let e_tag2 = storage
            .upload_part(TEST_BUCKET, "large", &upload_id, 2, b"def".to_vec())
            .await
            .unwrap();
        let e_tag1 = storage
            .upload_part(TEST_BUCKET, "large", &upload_id, 1, b"abc".to_vec())
            .await
            .unwrap();

        let parts = storage
            .list_parts(TEST_BUCKET, "large", &upload_id)
            .await
            .unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].part_number, 1);
        assert_eq!(parts[0].e_tag, e_tag1);
        assert_eq!(parts[1].size, 3);

        let e_tag = storage
            .complete_multipart_upload(
                TEST_BUCKET,
                "large",
                &upload_id,
                vec![
                    CompletedPart {
                        part_number: 1,
                        e_tag: e_tag1,
                    },
                    CompletedPart {
                        part_number: 2,
                        e_tag: e_tag2,
                    },
                ],
            )
            .await
            .unwrap();
        assert!(e_tag.ends_with("-2"));

        let body = storage.get_object(TEST_BUCKET, "large", None).await.unwrap();
        assert_eq!(body, b"abcdef");

        let e = storage
            .list_parts(TEST_BUCKET, "large", &upload_id)
            .await
            .unwrap_err();
        assert_eq!(error_code(&e), "NoSuchUpload");
    }

    #[tokio::test]
    async fn complete_with_wrong_part_is_rejected() {
        init_dummy_tracing_subscriber();
        let (_root, storage) = create_storage().await;

        let upload_id = storage
            .initiate_multipart_upload(TEST_BUCKET, "large")
            .await
            .unwrap();
        storage
            .upload_part(TEST_BUCKET, "large", &upload_id, 1, b"abc".to_vec())
            .await
            .unwrap();

        let e = storage
            .complete_multipart_upload(
                TEST_BUCKET,
                "large",
                &upload_id,
                vec![CompletedPart {
                    part_number: 1,
                    e_tag: generate_e_tag(b"xyz"),
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(error_code(&e), "InvalidPart");

        let e = storage
            .upload_part(TEST_BUCKET, "large", &upload_id, 0, vec![])
            .await
            .unwrap_err();
        assert_eq!(error_code(&e), "InvalidPart");
    }

    #[tokio::test]
    async fn upload_part_copy() {
        init_dummy_tracing_subscriber();
        let (_root, storage) = create_storage().await;

        storage
            .put_object(TEST_BUCKET, "src", b"abcdef".to_vec())
            .await
            .unwrap();
        let upload_id = storage
            .initiate_multipart_upload(TEST_BUCKET, "dst")
            .await
            .unwrap();
        let e_tag = storage
            .upload_part_copy(
                TEST_BUCKET,
                "src",
                ByteRange::new(2, 2),
                TEST_BUCKET,
                "dst",
                &upload_id,
                1,
            )
            .await
            .unwrap();
        assert_eq!(e_tag, generate_e_tag(b"cd"));
    }

    #[tokio::test]
    async fn list_and_abort_multipart_uploads() {
        init_dummy_tracing_subscriber();
        let (_root, storage) = create_storage().await;

        let mut upload_ids = vec![];
        for key in ["dir/a", "dir/b", "other"] {
            upload_ids.push(
                storage
                    .initiate_multipart_upload(TEST_BUCKET, key)
                    .await
                    .unwrap(),
            );
        }

        let output = storage
            .list_multipart_uploads(TEST_BUCKET, "dir/", "", "", 1)
            .await
            .unwrap();
        assert_eq!(output.uploads.len(), 1);
        assert_eq!(output.uploads[0].key, "dir/a");
        assert!(output.is_truncated);

        let output = storage
            .list_multipart_uploads(
                TEST_BUCKET,
                "dir/",
                &output.next_key_marker,
                &output.next_upload_id_marker,
                1,
            )
            .await
            .unwrap();
        assert_eq!(output.uploads.len(), 1);
        assert_eq!(output.uploads[0].key, "dir/b");
        assert!(!output.is_truncated);

        storage
            .abort_multipart_upload(TEST_BUCKET, "dir/a", &upload_ids[0])
            .await
            .unwrap();
        let e = storage
            .abort_multipart_upload(TEST_BUCKET, "dir/a", &upload_ids[0])
            .await
            .unwrap_err();
        assert_eq!(error_code(&e), "NoSuchUpload");

        let e = storage
            .abort_multipart_upload(TEST_BUCKET, "dir/a", &upload_ids[1])
            .await
            .unwrap_err();
        assert_eq!(error_code(&e), "NoSuchUpload");

        let output = storage
            .list_multipart_uploads(TEST_BUCKET, "", "", "", 1000)
            .await
            .unwrap();
        assert_eq!(output.uploads.len(), 2);
    }

    #[tokio::test]
    async fn delete_object_and_bucket() {
        init_dummy_tracing_subscriber();
        let (_root, storage) = create_storage().await;

        storage
            .put_object(TEST_BUCKET, "key1", b"data".to_vec())
            .await
            .unwrap();

        let e = storage.delete_bucket(TEST_BUCKET).await.unwrap_err();
        assert_eq!(error_code(&e), "BucketNotEmpty");

        storage.delete_object(TEST_BUCKET, "key1", false).await.unwrap();
        storage.delete_object(TEST_BUCKET, "key1", true).await.unwrap();

        storage.delete_bucket(TEST_BUCKET).await.unwrap();
        assert!(!storage.bucket_exists(TEST_BUCKET).await.unwrap());
    }

    #[test]
    fn rolled_up_prefix_test() {
        init_dummy_tracing_subscriber();

        assert_eq!(rolled_up_prefix("a/b/c", "", Some("/")), Some("a/".to_string()));
        assert_eq!(rolled_up_prefix("a/b/c", "a/", Some("/")), Some("a/b/".to_string()));
        assert_eq!(rolled_up_prefix("a/b", "a/", Some("/")), None);
        assert_eq!(rolled_up_prefix("a/b", "", None), None);
    }

    fn keys_of(output: &ListObjectsOutput) -> Vec<&str> {
        output.objects.iter().map(|object| object.key.as_str()).collect()
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
