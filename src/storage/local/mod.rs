use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use tracing::{debug, trace, warn};
use walkdir::{DirEntry, WalkDir};

use crate::types::{FileDescriptor, PipelineCancellationToken};

pub mod fs_util;

/// Walks a local source path and produces one [`FileDescriptor`] per regular file and
/// per subdirectory (`dir/`).
///
/// A single file source produces one descriptor whose relative path is the file name.
#[derive(Debug, Clone)]
pub struct LocalFileLister {
    path: PathBuf,
    follow_symlinks: bool,
    only_current_dir: bool,
    excluded_dir: Option<PathBuf>,
    cancellation_token: PipelineCancellationToken,
}

impl LocalFileLister {
    pub fn new(
        path: &Path,
        follow_symlinks: bool,
        only_current_dir: bool,
        excluded_dir: Option<&Path>,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            follow_symlinks,
            only_current_dir,
            excluded_dir: excluded_dir.and_then(|dir| dir.canonicalize().ok()),
            cancellation_token,
        }
    }

    /// Sends every file below the source path to `sender`.
    ///
    /// Entries that disappear while walking are ignored. Other walk errors are logged and
    /// the entry is skipped.
    pub async fn list<T: From<FileDescriptor> + Send + Sync + 'static>(&self, sender: &Sender<T>) -> Result<()> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("source path not found: {}", self.path.display()))?;

        if !metadata.is_dir() {
            let file_name = self
                .path
                .file_name()
                .ok_or_else(|| anyhow!("invalid source path: {}", self.path.display()))?
                .to_string_lossy()
                .to_string();
            let base_dir = match self.path.parent() {
                Some(parent) => parent.to_path_buf(),
                None => PathBuf::new(),
            };
            let _ = sender
                .send(FileDescriptor::new(&file_name, &base_dir).into())
                .await;
            return Ok(());
        }

        let mut walker = WalkDir::new(&self.path)
            .follow_links(self.follow_symlinks)
            .min_depth(1);
        if self.only_current_dir {
            walker = walker.max_depth(1);
        }

        for entry in walker
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry))
        {
            if self.cancellation_token.is_cancelled() {
                trace!("list() canceled.");
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if let Some(inner) = e.io_error() {
                        if inner.kind() == io::ErrorKind::NotFound {
                            continue;
                        }
                    }

                    let path = e
                        .path()
                        .unwrap_or_else(|| Path::new(""))
                        .to_string_lossy()
                        .to_string();
                    let error = e.to_string();
                    warn!(path = path, error = error, "failed to list local files.");
                    continue;
                }
            };

            let Some(relative_path) = self.relative_path_of(&entry) else {
                continue;
            };

            if let Err(e) = sender
                .send(FileDescriptor::new(&relative_path, &self.path).into())
                .await
                .context("async_channel::Sender::send() failed.")
            {
                return if !sender.is_closed() { Err(e) } else { Ok(()) };
            }
        }

        Ok(())
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        let Some(excluded_dir) = &self.excluded_dir else {
            return false;
        };
        if !entry.file_type().is_dir() {
            return false;
        }

        entry
            .path()
            .canonicalize()
            .is_ok_and(|path| path == *excluded_dir)
    }

    // `None` for entries that are not transferred: symlinks that are not followed and
    // special files. Subdirectories are skipped too with --only-current-dir.
    fn relative_path_of(&self, entry: &DirEntry) -> Option<String> {
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let path = entry.path().to_string_lossy().to_string();
            debug!(path = path, "skip symbolic link.");
            return None;
        }

        let mut relative_path = fs_util::remove_local_path_prefix(
            &entry.path().to_string_lossy(),
            &self.path.to_string_lossy(),
        );
        if cfg!(windows) {
            relative_path = fs_util::convert_windows_directory_char_to_slash(&relative_path);
        }

        if file_type.is_dir() {
            if self.only_current_dir {
                return None;
            }
            return Some(format!("{relative_path}/"));
        }

        if !file_type.is_file() {
            let path = entry.path().to_string_lossy().to_string();
            debug!(path = path, "skip non regular file.");
            return None;
        }

        Some(relative_path)
    }
}
