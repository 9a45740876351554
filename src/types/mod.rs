use std::path::{Path, PathBuf};

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};
use tokio_util::sync::CancellationToken;

use crate::types::filter_rule::Filterable;

pub mod error;
pub mod filter_rule;
pub mod storage_url;

pub type PipelineCancellationToken = CancellationToken;

pub fn create_pipeline_cancellation_token() -> PipelineCancellationToken {
    CancellationToken::new()
}

/// A local file (or directory, when `relative_path` ends with `/`) found below `base_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileDescriptor {
    pub relative_path: String,
    pub base_dir: PathBuf,
}

impl FileDescriptor {
    pub fn new(relative_path: &str, base_dir: &Path) -> Self {
        Self {
            relative_path: relative_path.to_string(),
            base_dir: base_dir.to_path_buf(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.relative_path.ends_with('/')
    }

    pub fn path(&self) -> PathBuf {
        if self.relative_path.is_empty() {
            return self.base_dir.clone();
        }
        self.base_dir.join(self.relative_path.trim_end_matches('/'))
    }
}

/// A remote object. `prefix` + `key` is the full object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectDescriptor {
    pub prefix: String,
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
}

impl ObjectDescriptor {
    pub fn full_key(&self) -> String {
        format!("{}{}", self.prefix, self.key)
    }

    pub fn is_dir_marker(&self) -> bool {
        self.size == 0 && self.key.ends_with('/')
    }
}

/// An in-progress multipart upload session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadDescriptor {
    pub key: String,
    pub upload_id: String,
    pub initiated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransferItem {
    File(FileDescriptor),
    Object(ObjectDescriptor),
}

impl TransferItem {
    pub fn is_dir(&self) -> bool {
        match self {
            TransferItem::File(file) => file.is_dir(),
            TransferItem::Object(object) => object.is_dir_marker(),
        }
    }
}

impl From<FileDescriptor> for TransferItem {
    fn from(file: FileDescriptor) -> Self {
        TransferItem::File(file)
    }
}

impl From<ObjectDescriptor> for TransferItem {
    fn from(object: ObjectDescriptor) -> Self {
        TransferItem::Object(object)
    }
}

impl Filterable for FileDescriptor {
    fn relative_path(&self) -> &str {
        &self.relative_path
    }
}

impl Filterable for ObjectDescriptor {
    fn relative_path(&self) -> &str {
        &self.key
    }
}

impl Filterable for TransferItem {
    fn relative_path(&self) -> &str {
        match self {
            TransferItem::File(file) => file.relative_path(),
            TransferItem::Object(object) => object.relative_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RemovalItem {
    Object(ObjectDescriptor),
    MultipartUpload(UploadDescriptor),
}

impl From<ObjectDescriptor> for RemovalItem {
    fn from(object: ObjectDescriptor) -> Self {
        RemovalItem::Object(object)
    }
}

impl From<UploadDescriptor> for RemovalItem {
    fn from(upload: UploadDescriptor) -> Self {
        RemovalItem::MultipartUpload(upload)
    }
}

impl Filterable for RemovalItem {
    fn relative_path(&self) -> &str {
        match self {
            RemovalItem::Object(object) => object.relative_path(),
            RemovalItem::MultipartUpload(upload) => &upload.key,
        }
    }
}

bitflags! {
    /// Resource classes a removal batch may touch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OperationKind: u32 {
        const OBJECT = 0x0000_0001;
        const MULTIPART_UPLOAD = 0x0000_0010;
        const ALL = Self::OBJECT.bits() | Self::MULTIPART_UPLOAD.bits();
        const BUCKET = 0x1000_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOperation {
    Upload,
    Download,
    Copy,
}

impl TransferOperation {
    pub fn op_str(&self) -> &'static str {
        match self {
            TransferOperation::Upload => "upload",
            TransferOperation::Download => "download",
            TransferOperation::Copy => "copy",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            TransferOperation::Upload => "files",
            _ => "objects",
        }
    }
}

pub fn sha1_hex(value: &str) -> String {
    hex::encode(Sha1::digest(value.as_bytes()))
}
