use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;

pub const SCHEME_PREFIX: &str = "oss://";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingType {
    #[default]
    None,
    Url,
}

/// A path given on the command line: either an object storage location or a local path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUrl {
    Cloud(CloudUrl),
    File(FileUrl),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudUrl {
    pub bucket: String,
    pub object: String,
    url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUrl {
    pub path: String,
}

impl StorageUrl {
    pub fn parse(url: &str, encoding_type: EncodingType) -> Result<Self, String> {
        if url.to_lowercase().starts_with(SCHEME_PREFIX) {
            return Ok(StorageUrl::Cloud(CloudUrl::parse(url, encoding_type)?));
        }

        Ok(StorageUrl::File(FileUrl::parse(url, encoding_type)?))
    }

    pub fn is_cloud_url(&self) -> bool {
        matches!(self, StorageUrl::Cloud(_))
    }

    pub fn is_file_url(&self) -> bool {
        matches!(self, StorageUrl::File(_))
    }

    pub fn as_cloud(&self) -> Option<&CloudUrl> {
        match self {
            StorageUrl::Cloud(cloud_url) => Some(cloud_url),
            StorageUrl::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileUrl> {
        match self {
            StorageUrl::Cloud(_) => None,
            StorageUrl::File(file_url) => Some(file_url),
        }
    }
}

impl FromStr for StorageUrl {
    type Err = String;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        StorageUrl::parse(url, EncodingType::None)
    }
}

impl fmt::Display for StorageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageUrl::Cloud(cloud_url) => cloud_url.fmt(f),
            StorageUrl::File(file_url) => file_url.fmt(f),
        }
    }
}

impl CloudUrl {
    pub fn new(bucket: &str, object: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            object: object.to_string(),
            url: format_cloud_url(bucket, object),
        }
    }

    pub fn parse(url: &str, encoding_type: EncodingType) -> Result<Self, String> {
        if !url.to_lowercase().starts_with(SCHEME_PREFIX) {
            return Err(format!(
                "invalid cloud url: \"{url}\", please make sure the url starts with: \"{SCHEME_PREFIX}\""
            ));
        }

        let path = &url[SCHEME_PREFIX.len()..];
        let (bucket, object) = match path.split_once('/') {
            Some((bucket, object)) => (bucket.to_string(), object.to_string()),
            None => (path.to_string(), String::new()),
        };

        let object = if encoding_type == EncodingType::Url && !object.is_empty() {
            query_unescape(&object).map_err(|e| {
                format!("invalid cloud url: {url}, object name is not url encoded, {e}")
            })?
        } else {
            object
        };

        if bucket.is_empty() && !object.is_empty() {
            return Err(format!("invalid cloud url: {url}, miss bucket"));
        }
        if encoding_type == EncodingType::Url && !bucket.is_empty() && object.is_empty() {
            if let Ok(decoded) = query_unescape(&bucket) {
                if decoded != bucket {
                    return Err(format!(
                        "invalid cloud url: {url}, bucket url do not support --encoding-type option"
                    ));
                }
            }
        }

        Ok(Self {
            bucket,
            object,
            url: url.to_string(),
        })
    }

    pub fn check_bucket(&self) -> Result<(), String> {
        if self.bucket.is_empty() {
            return Err(format!("invalid cloud url: {}, miss bucket", self.url));
        }
        Ok(())
    }

    pub fn check_object_prefix(&self) -> Result<(), String> {
        if self.object.starts_with('/') {
            return Err(format!(
                "invalid cloud url: {}, object name should not begin with \"/\"",
                self.url
            ));
        }
        if self.object.starts_with('\\') {
            return Err(format!(
                "invalid cloud url: {}, object name should not begin with \"\\\"",
                self.url
            ));
        }
        Ok(())
    }

    /// Same bucket, different object.
    pub fn with_object(&self, object: &str) -> Self {
        Self::new(&self.bucket, object)
    }
}

impl fmt::Display for CloudUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_cloud_url(&self.bucket, &self.object))
    }
}

impl FileUrl {
    pub fn parse(url: &str, encoding_type: EncodingType) -> Result<Self, String> {
        let mut path = if encoding_type == EncodingType::Url {
            query_unescape(url)
                .map_err(|e| format!("invalid cloud url: {url}, file name is not url encoded, {e}"))?
        } else {
            url.to_string()
        };

        let home_prefix = format!("~{}", std::path::MAIN_SEPARATOR);
        if path.starts_with(&home_prefix) {
            let home_dir = current_home_dir();
            if home_dir.is_empty() {
                return Err("current home dir is empty".to_string());
            }
            path = path.replacen('~', &home_dir, 1);
        }

        Ok(Self { path })
    }

    pub fn is_dir_path(&self) -> bool {
        self.path.ends_with('/') || self.path.ends_with(std::path::MAIN_SEPARATOR)
    }
}

impl fmt::Display for FileUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

pub fn format_cloud_url(bucket: &str, object: &str) -> String {
    if object.is_empty() {
        return format!("{SCHEME_PREFIX}{bucket}");
    }
    format!("{SCHEME_PREFIX}{bucket}/{object}")
}

fn current_home_dir() -> String {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    std::env::var(var).unwrap_or_default()
}

// '+' is a space and every '%' must start a two digit hex escape.
fn query_unescape(value: &str) -> Result<String, String> {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(format!(
                    "invalid URL escape \"{}\"",
                    String::from_utf8_lossy(&bytes[i..end])
                ));
            }
            i += 3;
            continue;
        }
        i += 1;
    }

    percent_decode_str(&value.replace('+', " "))
        .decode_utf8()
        .map(|decoded| decoded.to_string())
        .map_err(|e| e.to_string())
}
