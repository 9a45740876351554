use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum OssbulkError {
    #[error("a object references a parent directory.")]
    DirectoryTraversalError,
    #[error("cancelled")]
    Cancelled,
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("zero-length range has been requested: {0}")]
    ZeroLengthRange(String),
    #[error("source has been changed while transferring: {0}")]
    SourceChanged(String),
}

/// Errors reported by an object storage service.
///
/// `code()` follows the service error code vocabulary so that callers can decide
/// whether an error stops the whole batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("The specified bucket does not exist: {0}")]
    NoSuchBucket(String),
    #[error("The specified key does not exist: {0}")]
    NoSuchKey(String),
    #[error("The specified upload does not exist: {0}")]
    NoSuchUpload(String),
    #[error("The bucket you tried to delete is not empty: {0}")]
    BucketNotEmpty(String),
    #[error("One or more of the specified parts could not be found: {0}")]
    InvalidPart(String),
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("The specified bucket is not valid: {0}")]
    InvalidBucketName(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("io error: {0}")]
    Io(String),
}

const FATAL_ERROR_CODES: [&str; 6] = [
    "NoSuchBucket",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "AccessDenied",
    "RequestTimeTooSkewed",
    "InvalidBucketName",
];

impl StorageError {
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::NoSuchBucket(_) => "NoSuchBucket",
            StorageError::NoSuchKey(_) => "NoSuchKey",
            StorageError::NoSuchUpload(_) => "NoSuchUpload",
            StorageError::BucketNotEmpty(_) => "BucketNotEmpty",
            StorageError::InvalidPart(_) => "InvalidPart",
            StorageError::AccessDenied(_) => "AccessDenied",
            StorageError::InvalidBucketName(_) => "InvalidBucketName",
            StorageError::Internal(_) => "InternalError",
            StorageError::Io(_) => "IoError",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            StorageError::NoSuchBucket(_)
            | StorageError::NoSuchKey(_)
            | StorageError::NoSuchUpload(_) => 404,
            StorageError::BucketNotEmpty(_) => 409,
            StorageError::InvalidPart(_) | StorageError::InvalidBucketName(_) => 400,
            StorageError::AccessDenied(_) => 403,
            StorageError::Internal(_) | StorageError::Io(_) => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        500 <= self.status_code()
    }

    pub fn is_fatal(&self) -> bool {
        FATAL_ERROR_CODES.contains(&self.code())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

pub fn storage_error_of(e: &anyhow::Error) -> Option<&StorageError> {
    e.chain().find_map(|cause| cause.downcast_ref::<StorageError>())
}

pub fn is_cancelled_error(e: &anyhow::Error) -> bool {
    e.chain()
        .any(|cause| cause.downcast_ref::<OssbulkError>() == Some(&OssbulkError::Cancelled))
}
