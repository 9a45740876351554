use std::fmt;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::types::filter_rule::FilterRules;
use crate::types::storage_url::{CloudUrl, EncodingType, StorageUrl};
use crate::types::{OperationKind, TransferOperation};

pub mod args;

/// Asked before an existing destination is overwritten. Returns `true` to overwrite.
#[derive(Clone)]
pub struct ConfirmCallback(Arc<dyn Fn(&str) -> bool + Send + Sync>);

impl ConfirmCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    pub fn confirm(&self, prompt: &str) -> bool {
        (self.0)(prompt)
    }
}

impl Debug for ConfirmCallback {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("ConfirmCallback")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub command: CommandConfig,
    pub storage_root: PathBuf,
    pub max_keys: i32,
    pub tracing_config: Option<TracingConfig>,
    pub confirm_callback: Option<ConfirmCallback>,
}

#[derive(Debug, Clone)]
pub enum CommandConfig {
    Copy(CopyConfig),
    Remove(RemoveConfig),
}

#[derive(Debug, Clone)]
pub struct CopyConfig {
    pub source: StorageUrl,
    pub target: StorageUrl,
    pub operation: TransferOperation,
    pub recursive: bool,
    pub force: bool,
    pub update: bool,
    pub only_current_dir: bool,
    pub disable_dir_object: bool,
    pub disable_ignore_error: bool,
    pub follow_symlinks: bool,
    pub worker_size: u16,
    pub transfer_config: TransferConfig,
    pub checkpoint_dir: PathBuf,
    pub snapshot_path: Option<PathBuf>,
    pub range: Option<String>,
    pub output_dir: PathBuf,
    pub filter_config: FilterConfig,
    pub force_retry_config: ForceRetryConfig,
    pub encoding_type: EncodingType,
}

impl CopyConfig {
    /// Item errors are recorded and the batch continues.
    pub fn ignore_item_errors(&self) -> bool {
        self.recursive && !self.disable_ignore_error
    }

    /// The overwrite confirmation is skipped when any of these options decides for the user.
    pub fn overwrite_decided(&self) -> bool {
        self.force || self.update || self.snapshot_path.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct RemoveConfig {
    pub target: CloudUrl,
    pub recursive: bool,
    pub force: bool,
    pub bucket: bool,
    pub multipart: bool,
    pub all_type: bool,
    pub all_versions: bool,
    pub worker_size: u16,
    pub filter_config: FilterConfig,
    pub force_retry_config: ForceRetryConfig,
    pub encoding_type: EncodingType,
}

impl RemoveConfig {
    pub fn operation_kind(&self) -> OperationKind {
        build_operation_kind(self.recursive, self.bucket, self.multipart, self.all_type)
    }

    /// Prompt shown before work starts, or `None` when no confirmation is needed.
    pub fn confirmation_prompt(&self) -> Option<String> {
        if self.force {
            return None;
        }

        let kind = self.operation_kind();
        if self.recursive && kind.intersects(OperationKind::ALL) {
            let mut subjects = vec![];
            if kind.contains(OperationKind::OBJECT) {
                subjects.push("objects");
            }
            if kind.contains(OperationKind::MULTIPART_UPLOAD) {
                subjects.push("multipart uploadIds");
            }
            return Some(format!(
                "Do you really mean to remove recursively {} of {}(y or N)? ",
                subjects.join(" and "),
                self.target
            ));
        }

        None
    }

    pub fn bucket_confirmation_prompt(&self) -> Option<String> {
        if self.force || !self.operation_kind().contains(OperationKind::BUCKET) {
            return None;
        }

        Some(format!(
            "Do you really mean to remove the Bucket: {}(y or N)? ",
            self.target.bucket
        ))
    }
}

fn build_operation_kind(recursive: bool, bucket: bool, multipart: bool, all_type: bool) -> OperationKind {
    let mut kind = OperationKind::empty();
    if multipart {
        kind |= OperationKind::MULTIPART_UPLOAD;
    }
    if all_type {
        kind |= OperationKind::ALL;
    }
    if bucket {
        kind |= OperationKind::BUCKET;
    }

    if !recursive {
        if kind.is_empty() {
            kind |= OperationKind::OBJECT;
        }
    } else if !kind.intersects(OperationKind::ALL) {
        kind |= OperationKind::OBJECT;
    }

    kind
}

#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ForceRetryConfig {
    pub force_retry_count: u32,
    pub force_retry_interval_milliseconds: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub multipart_threshold: u64,
    pub part_size: Option<u64>,
    pub parallel: Option<u16>,
}

impl TransferConfig {
    pub fn is_multipart_required(&self, content_length: u64) -> bool {
        self.multipart_threshold <= content_length
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    pub rules: FilterRules,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl FilterConfig {
    /// Whether `last_modified` falls outside the `--start-time`/`--end-time` window.
    pub fn is_out_of_time_window(&self, last_modified: &DateTime<Utc>) -> bool {
        if let Some(start_time) = self.start_time {
            if *last_modified < start_time {
                return true;
            }
        }
        if let Some(end_time) = self.end_time {
            if end_time < *last_modified {
                return true;
            }
        }
        false
    }
}
