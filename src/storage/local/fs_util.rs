use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use filetime::{FileTime, set_file_mtime};
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::trace;

static DIRECTORY_TRAVERSAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\.[/\\]").unwrap());
static ROOT_SLASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/+").unwrap());

pub fn check_directory_traversal(key: &str) -> bool {
    DIRECTORY_TRAVERSAL.is_match(key)
}

pub async fn get_last_modified(path: &Path) -> Result<DateTime<Utc>> {
    let modified = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("tokio::fs::metadata() failed: {}", path.display()))?
        .modified()
        .context("std::fs::Metadata::modified() failed.")?;

    Ok(DateTime::<Utc>::from(modified))
}

pub fn set_last_modified(path: &Path, last_modified: &DateTime<Utc>) -> std::io::Result<()> {
    set_file_mtime(
        path,
        FileTime::from_unix_time(
            last_modified.timestamp(),
            last_modified.timestamp_subsec_nanos(),
        ),
    )
}

pub fn is_key_a_directory(key: &str) -> bool {
    if cfg!(windows) && key.ends_with('\\') {
        return true;
    }

    key.ends_with('/')
}

/// A temporary file next to `path`, so that it can be renamed over `path` atomically.
pub async fn create_temp_file_next_to(path: &Path) -> Result<NamedTempFile> {
    let directory = create_parent_directory(path).await?;
    let file = NamedTempFile::new_in(directory).context("NamedTempFile::new_in failed.")?;
    Ok(file)
}

pub async fn create_parent_directory(path: &Path) -> Result<PathBuf> {
    let directory_path = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if tokio::fs::try_exists(&directory_path).await.unwrap_or(false) {
        return Ok(directory_path);
    }

    tokio::fs::create_dir_all(&directory_path)
        .await
        .context("tokio::fs::create_dir_all() failed.")?;

    let directory = directory_path.to_string_lossy().to_string();
    trace!(directory = directory, "directory created.");

    Ok(directory_path)
}

pub fn remove_root_slash(key: &str) -> String {
    ROOT_SLASHES.replace(key, "").to_string()
}

/// Joins a `/` separated key below `path` using the platform separator.
pub fn key_to_file_path(path: &Path, key: &str) -> PathBuf {
    let file = convert_os_specific_directory_char(&remove_root_slash(key));
    let lossy_path = path.to_string_lossy();

    if lossy_path.is_empty()
        || lossy_path.ends_with('/')
        || lossy_path.ends_with(std::path::MAIN_SEPARATOR)
    {
        return format!("{lossy_path}{file}").into();
    }
    format!("{lossy_path}{}{file}", std::path::MAIN_SEPARATOR).into()
}

pub fn remove_local_path_prefix(path: &str, prefix: &str) -> String {
    let mut without_prefix_path = path.replacen(prefix, "", 1);

    if without_prefix_path.starts_with(std::path::MAIN_SEPARATOR) {
        without_prefix_path = without_prefix_path.replacen(std::path::MAIN_SEPARATOR, "", 1);
    }
    without_prefix_path
}

pub fn convert_windows_directory_char_to_slash(path: &str) -> String {
    path.replace('\\', "/")
}

fn convert_os_specific_directory_char(key: &str) -> String {
    key.replace('/', std::path::MAIN_SEPARATOR_STR)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn check_directory_traversal_test() {
        init_dummy_tracing_subscriber();

        assert!(check_directory_traversal("../etc/passwd"));
        assert!(check_directory_traversal("dir1/dir2/../../etc/passwd"));
        assert!(check_directory_traversal("..\\etc\\passwd"));

        assert!(!check_directory_traversal("/etc/passwd"));
        assert!(!check_directory_traversal("passwd"));
        assert!(!check_directory_traversal("/xyz/test..jpg"));
        assert!(!check_directory_traversal("dir../a"));
    }

    #[test]
    fn is_key_directory_test() {
        init_dummy_tracing_subscriber();

        assert!(is_key_a_directory("dir/"));
        assert!(is_key_a_directory("/dir1/dir2/"));
        assert!(!is_key_a_directory("dir"));
        assert!(!is_key_a_directory("/dir1/dir2"));
    }

    #[tokio::test]
    async fn last_modified_round_trip() {
        init_dummy_tracing_subscriber();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file1");
        std::fs::write(&path, b"abc").unwrap();

        let last_modified = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        set_last_modified(&path, &last_modified).unwrap();
        assert_eq!(get_last_modified(&path).await.unwrap(), last_modified);

        assert!(get_last_modified(&dir.path().join("none")).await.is_err());
    }

    #[tokio::test]
    async fn create_temp_file_creates_parent_directories() {
        init_dummy_tracing_subscriber();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dir1").join("dir2").join("file1");

        let temp_file = create_temp_file_next_to(&path).await.unwrap();
        assert_eq!(temp_file.path().parent().unwrap(), path.parent().unwrap());
    }

    #[test]
    #[cfg(target_family = "unix")]
    fn key_to_file_path_unix() {
        init_dummy_tracing_subscriber();

        assert_eq!(
            key_to_file_path(Path::new("dir1"), "key/file1"),
            PathBuf::from("dir1/key/file1")
        );
        assert_eq!(
            key_to_file_path(Path::new("dir1/"), "/key/file1"),
            PathBuf::from("dir1/key/file1")
        );
        assert_eq!(key_to_file_path(Path::new(""), "file1"), PathBuf::from("file1"));
    }

    #[test]
    #[cfg(target_family = "unix")]
    fn remove_local_path_prefix_unix() {
        init_dummy_tracing_subscriber();

        assert_eq!(remove_local_path_prefix("./dir1/data1", "./dir1"), "data1");
        assert_eq!(remove_local_path_prefix("./dir1/data1", "./dir1/"), "data1");
        assert_eq!(
            remove_local_path_prefix("/dir1/dir2/data1", "/dir1"),
            "dir2/data1"
        );
    }

    #[test]
    fn remove_root_slash_test() {
        init_dummy_tracing_subscriber();

        assert_eq!(remove_root_slash("//dir1/a"), "dir1/a");
        assert_eq!(remove_root_slash("dir1/a"), "dir1/a");
        assert_eq!(convert_windows_directory_char_to_slash("a\\b"), "a/b");
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
