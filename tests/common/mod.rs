#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::SystemTime;

use anyhow::Result;
use async_trait::async_trait;
use filetime::{FileTime, set_file_mtime};
use tempfile::TempDir;
use uuid::Uuid;
use walkdir::{DirEntry, WalkDir};

use ossbulk::Config;
use ossbulk::config::args::parse_from_args;
use ossbulk::monitor::{CopyMonitorSnapshot, Monitor, RemoveMonitorSnapshot};
use ossbulk::pipeline::Pipeline;
use ossbulk::storage::fs_bucket::FsBucketStorage;
use ossbulk::storage::{
    ByteRange, CompletedPart, ListMultipartUploadsOutput, ListObjectsOutput, ObjectEntry,
    PartEntry, Storage, StorageTrait,
};
use ossbulk::types::create_pipeline_cancellation_token;
use ossbulk::types::error::StorageError;

pub const KIB: usize = 1024;

/// A workspace holding the storage root, local files and the run directories of one test.
pub struct TestHelper {
    workspace: TempDir,
    storage: FsBucketStorage,
    pub bucket: String,
}

impl TestHelper {
    pub async fn new() -> Self {
        let workspace = TempDir::new().unwrap();
        let storage = FsBucketStorage::new(&workspace.path().join("storage"));
        let bucket = Self::generate_bucket_name();
        storage.create_bucket(&bucket).await.unwrap();

        Self {
            workspace,
            storage,
            bucket,
        }
    }

    pub fn generate_bucket_name() -> String {
        format!("bucket-{}", Uuid::new_v4())
    }

    pub fn storage(&self) -> &FsBucketStorage {
        &self.storage
    }

    pub fn storage_root(&self) -> PathBuf {
        self.workspace.path().join("storage")
    }

    pub fn path(&self, relative_path: &str) -> PathBuf {
        self.workspace.path().join(relative_path)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.path("checkpoint")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path("output")
    }

    pub fn bucket_url(&self, object: &str) -> String {
        if object.is_empty() {
            return format!("oss://{}", self.bucket);
        }
        format!("oss://{}/{}", self.bucket, object)
    }

    /// `cp` arguments pointing the storage root, checkpoints and reports into the workspace.
    pub fn copy_args(&self, args: &[&str]) -> Vec<String> {
        let mut all_args = vec![
            "ossbulk".to_string(),
            "-qq".to_string(),
            "cp".to_string(),
            "--storage-root".to_string(),
            path_arg(&self.storage_root()),
            "--checkpoint-dir".to_string(),
            path_arg(&self.checkpoint_dir()),
            "--output-dir".to_string(),
            path_arg(&self.output_dir()),
        ];
        all_args.extend(args.iter().map(|arg| arg.to_string()));
        all_args
    }

    pub fn remove_args(&self, args: &[&str]) -> Vec<String> {
        let mut all_args = vec![
            "ossbulk".to_string(),
            "-qq".to_string(),
            "rm".to_string(),
            "--storage-root".to_string(),
            path_arg(&self.storage_root()),
        ];
        all_args.extend(args.iter().map(|arg| arg.to_string()));
        all_args
    }

    pub fn build_config(args: Vec<String>) -> Config {
        Config::try_from(parse_from_args(args).unwrap()).unwrap()
    }

    pub async fn run(config: Config) -> Pipeline {
        let mut pipeline = Pipeline::new(config, create_pipeline_cancellation_token());
        pipeline.run().await;
        pipeline
    }

    pub async fn run_with_storage(config: Config, storage: Storage) -> Pipeline {
        let mut pipeline =
            Pipeline::new_with_storage(config, storage, create_pipeline_cancellation_token());
        pipeline.run().await;
        pipeline
    }

    pub fn copy_snapshot(pipeline: &Pipeline) -> CopyMonitorSnapshot {
        match pipeline.monitor() {
            Monitor::Copy(monitor) => monitor.snapshot(),
            Monitor::Remove(_) => panic!("copy monitor expected"),
        }
    }

    pub fn remove_snapshot(pipeline: &Pipeline) -> RemoveMonitorSnapshot {
        match pipeline.monitor() {
            Monitor::Remove(monitor) => monitor.snapshot(),
            Monitor::Copy(_) => panic!("remove monitor expected"),
        }
    }

    pub fn write_file(&self, relative_path: &str, content: &[u8]) -> PathBuf {
        let path = self.path(relative_path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn write_sized_file(&self, relative_path: &str, size: usize) -> PathBuf {
        self.write_file(relative_path, &sized_content(size))
    }

    /// The source tree most scenarios start from.
    pub fn write_source_tree(&self) -> PathBuf {
        self.write_file("source/a.txt", b"a");
        self.write_file("source/b.jpg", b"bb");
        self.write_file("source/dir1/c.txt", b"ccc");
        self.write_file("source/dir1/d.jpg", b"dddd");
        self.path("source")
    }

    pub async fn put_object(&self, key: &str, body: &[u8]) {
        self.storage
            .put_object(&self.bucket, key, body.to_vec())
            .await
            .unwrap();
    }

    pub async fn get_object(&self, key: &str) -> Vec<u8> {
        self.storage
            .get_object(&self.bucket, key, None)
            .await
            .unwrap()
    }

    pub async fn is_object_exist(&self, key: &str) -> bool {
        self.storage.head_object(&self.bucket, key).await.is_ok()
    }

    pub async fn list_keys(&self, prefix: &str) -> Vec<String> {
        let mut keys = vec![];
        let mut marker = String::new();
        loop {
            let output = self
                .storage
                .list_objects(&self.bucket, prefix, &marker, None, 1000)
                .await
                .unwrap();
            keys.extend(output.objects.into_iter().map(|object| object.key));
            if !output.is_truncated {
                return keys;
            }
            marker = output.next_marker;
        }
    }

    pub async fn list_upload_ids(&self, prefix: &str) -> Vec<String> {
        self.storage
            .list_multipart_uploads(&self.bucket, prefix, "", "", 1000)
            .await
            .unwrap()
            .uploads
            .into_iter()
            .map(|upload| upload.upload_id)
            .collect()
    }

    pub fn list_all_files(path: &Path) -> Vec<DirEntry> {
        WalkDir::new(path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .collect()
    }

    pub fn md5_digest(content: &[u8]) -> String {
        format!("{:x}", md5::compute(content))
    }

    pub fn touch_file(path: &Path, add_sec: i64) {
        set_file_mtime(
            path,
            FileTime::from_unix_time(
                SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .unwrap()
                    .as_secs() as i64
                    + add_sec,
                0,
            ),
        )
        .unwrap();
    }

    pub fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}

pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

pub fn sized_content(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Where a [`FaultInjectingStorage`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    UploadPart(i32),
    UploadPartCopy(i32),
    /// A ranged `get_object` starting at the offset.
    GetObjectAt(u64),
    PutObject,
    DeleteObject,
}

#[derive(Debug)]
struct Fault {
    point: FaultPoint,
    error: StorageError,
    remaining: AtomicU32,
    calls: AtomicU32,
}

/// Passes every call to a [`FsBucketStorage`] but fails the calls hitting a [`FaultPoint`]
/// with a fixed error, a fixed number of times. Calls of the faulted operation are counted.
#[derive(Debug, Clone)]
pub struct FaultInjectingStorage {
    inner: FsBucketStorage,
    fault: Arc<Fault>,
}

impl FaultInjectingStorage {
    pub fn new(root: &Path, point: FaultPoint, error: StorageError, failures: u32) -> Self {
        Self {
            inner: FsBucketStorage::new(root),
            fault: Arc::new(Fault {
                point,
                error,
                remaining: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }),
        }
    }

    pub fn boxed(&self) -> Storage {
        Box::new(self.clone())
    }

    /// Calls made to the faulted operation, failed ones included.
    pub fn calls(&self) -> u32 {
        self.fault.calls.load(Ordering::SeqCst)
    }

    fn count(&self, operation: FaultPoint) {
        if std::mem::discriminant(&operation) == std::mem::discriminant(&self.fault.point) {
            self.fault.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn inject(&self, point: FaultPoint) -> Result<()> {
        self.count(point);
        if point != self.fault.point {
            return Ok(());
        }

        let fail = self
            .fault
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if fail {
            return Err(self.fault.error.clone().into());
        }
        Ok(())
    }
}

#[async_trait]
impl StorageTrait for FaultInjectingStorage {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.inner.bucket_exists(bucket).await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: Option<&str>,
        max_keys: i32,
    ) -> Result<ListObjectsOutput> {
        self.inner
            .list_objects(bucket, prefix, marker, delimiter, max_keys)
            .await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectEntry> {
        self.inner.head_object(bucket, key).await
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Vec<u8>> {
        if let Some(range) = range {
            self.inject(FaultPoint::GetObjectAt(range.offset))?;
        }
        self.inner.get_object(bucket, key, range).await
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<String> {
        self.inject(FaultPoint::PutObject)?;
        self.inner.put_object(bucket, key, body).await
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
    ) -> Result<String> {
        self.inner
            .copy_object(source_bucket, source_key, bucket, key)
            .await
    }

    async fn initiate_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        self.inner.initiate_multipart_upload(bucket, key).await
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String> {
        self.inject(FaultPoint::UploadPart(part_number))?;
        self.inner
            .upload_part(bucket, key, upload_id, part_number, body)
            .await
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
        self.inject(FaultPoint::UploadPartCopy(part_number))?;
        self.inner
            .upload_part_copy(
                source_bucket,
                source_key,
                range,
                bucket,
                key,
                upload_id,
                part_number,
            )
            .await
    }

    async fn list_parts(&self, bucket: &str, key: &str, upload_id: &str) -> Result<Vec<PartEntry>> {
        self.inner.list_parts(bucket, key, upload_id).await
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<String> {
        self.inner
            .complete_multipart_upload(bucket, key, upload_id, parts)
            .await
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        self.inner.abort_multipart_upload(bucket, key, upload_id).await
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        upload_id_marker: &str,
        max_uploads: i32,
    ) -> Result<ListMultipartUploadsOutput> {
        self.inner
            .list_multipart_uploads(bucket, prefix, key_marker, upload_id_marker, max_uploads)
            .await
    }

    async fn delete_object(&self, bucket: &str, key: &str, all_versions: bool) -> Result<()> {
        self.inject(FaultPoint::DeleteObject)?;
        self.inner.delete_object(bucket, key, all_versions).await
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.inner.delete_bucket(bucket).await
    }
}
