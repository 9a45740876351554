use crate::Config;
use crate::config::args::value_parser::{filter_pattern, human_bytes, storage_url};
use crate::config::{
    CommandConfig, CopyConfig, FilterConfig, ForceRetryConfig, RemoveConfig, TracingConfig,
    TransferConfig,
};
use crate::types::TransferOperation;
use crate::types::filter_rule::{FilterRule, FilterRules};
use crate::types::storage_url::{CloudUrl, EncodingType, StorageUrl};
use chrono::{DateTime, TimeZone, Utc};
use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
#[cfg(feature = "version")]
use shadow_rs::shadow;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod value_parser;

const DEFAULT_STORAGE_ROOT: &str = "ossbulk_storage";
const DEFAULT_MAX_KEYS: i32 = 1000;
const DEFAULT_WORKER_SIZE: u16 = 3;
const DEFAULT_FORCE_RETRY_COUNT: u32 = 10;
const DEFAULT_FORCE_RETRY_INTERVAL_MILLISECONDS: u64 = 1000;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_BIGFILE_THRESHOLD: &str = "100MiB";
const DEFAULT_CHECKPOINT_DIR: &str = ".ossbulk_checkpoint";
const DEFAULT_OUTPUT_DIR: &str = "ossbulk_output";
const DEFAULT_RECURSIVE: bool = false;
const DEFAULT_FORCE: bool = false;
const DEFAULT_UPDATE: bool = false;
const DEFAULT_ONLY_CURRENT_DIR: bool = false;
const DEFAULT_DISABLE_DIR_OBJECT: bool = false;
const DEFAULT_DISABLE_IGNORE_ERROR: bool = false;
const DEFAULT_ENABLE_SYMLINK_DIR: bool = false;
const DEFAULT_BUCKET: bool = false;
const DEFAULT_MULTIPART: bool = false;
const DEFAULT_ALL_TYPE: bool = false;
const DEFAULT_ALL_VERSIONS: bool = false;

const NO_SUBCOMMAND_SPECIFIED: &str = "a subcommand must be specified: cp or rm\n";
const LOCAL_TO_LOCAL_NOT_ALLOWED: &str = "copy files between local file system is not allowed, please make sure the source or the target starts with \"oss://\"\n";
const FILTER_REQUIRES_RECURSIVE: &str = "--include or --exclude only work with --recursive\n";
const RANGE_REQUIRES_DOWNLOAD: &str = "only download support option --range\n";
const SNAPSHOT_NOT_SUPPORTED_WITH_COPY: &str =
    "server-side copy doesn't support option --snapshot-path\n";
const INVALID_UNIX_TIME: &str = "invalid unix time\n";
const REMOVE_BUCKET_REDUNDANT_OPTION: &str = "remove bucket redundant option: --multipart or --all-type, if you mean remove all objects and the bucket meanwhile, you should add --recursive option\n";
const REMOVE_OBJECT_REDUNDANT_OPTION: &str = "remove object redundant option: --bucket, remove bucket after remove single object is not supported\n";

#[cfg(feature = "version")]
shadow!(build);

#[derive(Parser, Clone, Debug)]
#[cfg_attr(feature = "version", command(version=format!("{} ({} {}), {}", build::PKG_VERSION, build::SHORT_COMMIT, build::BUILD_TARGET, build::RUST_VERSION)))]
pub struct CLIArgs {
    #[command(subcommand)]
    command: Option<Commands>,

    /// root directory of the directory-backed object storage service. each bucket is a directory under it
    #[arg(long, env, global = true, default_value = DEFAULT_STORAGE_ROOT, value_name = "DIRECTORY", help_heading = "Storage")]
    storage_root: PathBuf,

    /// maximum number of objects returned in a single list request
    #[arg(long, env, global = true, default_value_t = DEFAULT_MAX_KEYS, value_parser = clap::value_parser!(i32).range(1..=1000), help_heading = "Storage")]
    max_keys: i32,

    /// trace verbosity(-v: show info, -vv: show debug, -vvv show trace)
    #[clap(flatten)]
    verbosity: Verbosity<WarnLevel>,

    /// show trace as json format
    #[arg(long, env, global = true, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Tracing/Logging")]
    json_tracing: bool,

    /// show span event tracing
    #[arg(long, env, global = true, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Tracing/Logging")]
    span_events_tracing: bool,

    /// disable ANSI terminal colors
    #[arg(long, env, global = true, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Tracing/Logging")]
    disable_color_tracing: bool,

    /// generate a auto completions script. Valid values: bash, fish, zsh, powershell, elvish.
    #[arg(long, env, value_name = "SHELL", value_parser = clap_complete::shells::Shell::from_str, help_heading = "Advanced")]
    auto_complete_shell: Option<clap_complete::shells::Shell>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// upload, download or copy objects
    Cp(CopyArgs),

    /// remove objects, multipart uploads or a bucket
    Rm(RemoveArgs),
}

#[derive(Args, Clone, Debug)]
pub struct CopyArgs {
    #[arg(env, help = "oss://<BUCKET_NAME>[/prefix] or local path", value_parser = storage_url::check_storage_url)]
    source: String,

    #[arg(env, help = "oss://<BUCKET_NAME>[/prefix] or local path", value_parser = storage_url::check_storage_url)]
    target: String,

    /// operate recursively. all the objects/files under the source are copied
    #[arg(short, long, env, default_value_t = DEFAULT_RECURSIVE, help_heading = "General")]
    recursive: bool,

    /// overwrite existing destinations without asking
    #[arg(short, long, env, default_value_t = DEFAULT_FORCE, help_heading = "General")]
    force: bool,

    /// copy only when the destination does not exist or is older than the source
    #[arg(short, long, env, default_value_t = DEFAULT_UPDATE, help_heading = "General")]
    update: bool,

    /// copy only the files or objects directly under the source directory
    #[arg(long, env, default_value_t = DEFAULT_ONLY_CURRENT_DIR, help_heading = "General")]
    only_current_dir: bool,

    /// do not create directory objects for local directories
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_DIR_OBJECT, help_heading = "General")]
    disable_dir_object: bool,

    /// stop the batch at the first item error instead of recording it and continuing
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_IGNORE_ERROR, help_heading = "General")]
    disable_ignore_error: bool,

    /// follow symbolic links to directories when walking the local source
    #[arg(long, env, default_value_t = DEFAULT_ENABLE_SYMLINK_DIR, help_heading = "General")]
    enable_symlink_dir: bool,

    /// object name encoding of the urls. valid choices: url
    #[arg(long, env, value_parser = PossibleValuesParser::new(["url"]), help_heading = "General")]
    encoding_type: Option<String>,

    /// include only names matching the shell pattern. can be repeated
    #[arg(long, value_parser = filter_pattern::check_filter_pattern, help_heading = "Filtering")]
    include: Vec<String>,

    /// exclude names matching the shell pattern. can be repeated
    #[arg(long, value_parser = filter_pattern::check_filter_pattern, help_heading = "Filtering")]
    exclude: Vec<String>,

    /// skip items modified before this time (unix seconds)
    #[arg(long, env, value_name = "UNIX_TIME", help_heading = "Filtering")]
    start_time: Option<i64>,

    /// skip items modified after this time (unix seconds)
    #[arg(long, env, value_name = "UNIX_TIME", help_heading = "Filtering")]
    end_time: Option<i64>,

    /// number of worker tasks
    #[arg(short = 'j', long, env, default_value_t = DEFAULT_WORKER_SIZE, value_parser = clap::value_parser!(u16).range(1..=10000), help_heading = "Performance")]
    routines: u16,

    /// objects at or above this size are transferred in parts with checkpoints
    #[arg(long, env, default_value = DEFAULT_BIGFILE_THRESHOLD, value_parser = human_bytes::check_human_bytes_without_limit, help_heading = "Performance")]
    bigfile_threshold: String,

    /// size of each part. computed from the object size when omitted
    #[arg(long, env, value_parser = human_bytes::check_part_size, help_heading = "Performance")]
    part_size: Option<String>,

    /// number of parts of one object transferred concurrently. computed from the part count when omitted
    #[arg(long, env, value_parser = clap::value_parser!(u16).range(1..=10000), help_heading = "Performance")]
    parallel: Option<u16>,

    /// directory that holds the checkpoint records of multipart transfers
    #[arg(long, env, default_value = DEFAULT_CHECKPOINT_DIR, value_name = "DIRECTORY", help_heading = "Resume")]
    checkpoint_dir: PathBuf,

    /// directory of the snapshot store. unchanged items recorded in it are skipped
    #[arg(long, env, value_name = "DIRECTORY", help_heading = "Resume")]
    snapshot_path: Option<PathBuf>,

    /// download only a byte range of the object. e.g. 3-9, 3-, -9
    #[arg(long, env, help_heading = "Advanced")]
    range: Option<String>,

    /// directory of the error report file
    #[arg(long, env, default_value = DEFAULT_OUTPUT_DIR, value_name = "DIRECTORY", help_heading = "Advanced")]
    output_dir: PathBuf,

    /// maximum attempts of a storage request on transient errors
    #[arg(long, env, default_value_t = DEFAULT_FORCE_RETRY_COUNT, value_parser = clap::value_parser!(u32).range(1..=500), help_heading = "Retry Options")]
    retry_times: u32,

    /// sleep interval (milliseconds) between retries
    #[arg(long, env, default_value_t = DEFAULT_FORCE_RETRY_INTERVAL_MILLISECONDS, value_name = "retry_interval", help_heading = "Retry Options")]
    retry_interval_milliseconds: u64,
}

#[derive(Args, Clone, Debug)]
pub struct RemoveArgs {
    #[arg(env, help = "oss://<BUCKET_NAME>[/prefix]", value_parser = storage_url::check_storage_url)]
    target: String,

    /// remove recursively all the objects under the prefix
    #[arg(short, long, env, default_value_t = DEFAULT_RECURSIVE, help_heading = "General")]
    recursive: bool,

    /// do not ask for confirmation
    #[arg(short, long, env, default_value_t = DEFAULT_FORCE, help_heading = "General")]
    force: bool,

    /// remove the bucket itself
    #[arg(short, long, env, default_value_t = DEFAULT_BUCKET, help_heading = "General")]
    bucket: bool,

    /// abort in-progress multipart uploads instead of removing objects
    #[arg(short, long, env, default_value_t = DEFAULT_MULTIPART, help_heading = "General")]
    multipart: bool,

    /// remove objects and abort in-progress multipart uploads
    #[arg(short, long, env, default_value_t = DEFAULT_ALL_TYPE, help_heading = "General")]
    all_type: bool,

    /// remove all versions of the objects
    #[arg(long, env, default_value_t = DEFAULT_ALL_VERSIONS, help_heading = "General")]
    all_versions: bool,

    /// object name encoding of the url. valid choices: url
    #[arg(long, env, value_parser = PossibleValuesParser::new(["url"]), help_heading = "General")]
    encoding_type: Option<String>,

    /// include only names matching the shell pattern. can be repeated
    #[arg(long, value_parser = filter_pattern::check_filter_pattern, help_heading = "Filtering")]
    include: Vec<String>,

    /// exclude names matching the shell pattern. can be repeated
    #[arg(long, value_parser = filter_pattern::check_filter_pattern, help_heading = "Filtering")]
    exclude: Vec<String>,

    /// number of worker tasks
    #[arg(short = 'j', long, env, default_value_t = DEFAULT_WORKER_SIZE, value_parser = clap::value_parser!(u16).range(1..=10000), help_heading = "Performance")]
    routines: u16,

    /// maximum attempts of a storage request on transient errors
    #[arg(long, env, default_value_t = DEFAULT_FORCE_RETRY_COUNT, value_parser = clap::value_parser!(u32).range(1..=500), help_heading = "Retry Options")]
    retry_times: u32,

    /// sleep interval (milliseconds) between retries
    #[arg(long, env, default_value_t = DEFAULT_FORCE_RETRY_INTERVAL_MILLISECONDS, value_name = "retry_interval", help_heading = "Retry Options")]
    retry_interval_milliseconds: u64,
}

pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let config_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    crate::Config::try_from(config_args)
}

impl CLIArgs {
    pub fn auto_complete_shell(&self) -> Option<clap_complete::shells::Shell> {
        self.auto_complete_shell
    }
}

impl CopyArgs {
    fn validate_copy_config(
        &self,
        source: &StorageUrl,
        target: &StorageUrl,
    ) -> Result<TransferOperation, String> {
        let operation = self.check_storage_combination(source, target)?;

        self.check_cloud_urls(source, target)?;
        self.check_filter_conflict()?;
        self.check_range_conflict(operation)?;
        self.check_snapshot_conflict(operation)?;
        self.check_time_window()?;
        self.check_single_object_source(source)?;
        self.check_copy_self(source, target)?;

        Ok(operation)
    }

    fn check_storage_combination(
        &self,
        source: &StorageUrl,
        target: &StorageUrl,
    ) -> Result<TransferOperation, String> {
        match (source, target) {
            (StorageUrl::File(_), StorageUrl::Cloud(_)) => Ok(TransferOperation::Upload),
            (StorageUrl::Cloud(_), StorageUrl::File(_)) => Ok(TransferOperation::Download),
            (StorageUrl::Cloud(_), StorageUrl::Cloud(_)) => Ok(TransferOperation::Copy),
            (StorageUrl::File(_), StorageUrl::File(_)) => {
                Err(LOCAL_TO_LOCAL_NOT_ALLOWED.to_string())
            }
        }
    }

    fn check_cloud_urls(&self, source: &StorageUrl, target: &StorageUrl) -> Result<(), String> {
        if let StorageUrl::Cloud(cloud_url) = source {
            cloud_url.check_bucket().map_err(with_newline)?;
            if self.recursive {
                cloud_url.check_object_prefix().map_err(with_newline)?;
            }
        }
        if let StorageUrl::Cloud(cloud_url) = target {
            cloud_url.check_bucket().map_err(with_newline)?;
            cloud_url.check_object_prefix().map_err(with_newline)?;
        }

        Ok(())
    }

    fn check_filter_conflict(&self) -> Result<(), String> {
        if !self.recursive && (!self.include.is_empty() || !self.exclude.is_empty()) {
            return Err(FILTER_REQUIRES_RECURSIVE.to_string());
        }
        Ok(())
    }

    fn check_range_conflict(&self, operation: TransferOperation) -> Result<(), String> {
        if self.range.is_some() && operation != TransferOperation::Download {
            return Err(RANGE_REQUIRES_DOWNLOAD.to_string());
        }
        Ok(())
    }

    fn check_snapshot_conflict(&self, operation: TransferOperation) -> Result<(), String> {
        if self.snapshot_path.is_some() && operation == TransferOperation::Copy {
            return Err(SNAPSHOT_NOT_SUPPORTED_WITH_COPY.to_string());
        }
        Ok(())
    }

    fn check_time_window(&self) -> Result<(), String> {
        if let (Some(start_time), Some(end_time)) = (self.start_time, self.end_time) {
            if start_time > end_time {
                return Err(format!(
                    "start time {start_time} is larger than end time {end_time}\n"
                ));
            }
        }
        Ok(())
    }

    fn check_single_object_source(&self, source: &StorageUrl) -> Result<(), String> {
        if self.recursive {
            return Ok(());
        }

        if let StorageUrl::Cloud(cloud_url) = source {
            if cloud_url.object.is_empty() {
                return Err(format!(
                    "copy object invalid url: {cloud_url}, object empty. If you mean batch copy objects, please use --recursive option\n"
                ));
            }
            if cloud_url.object.ends_with('/') {
                return Err(format!(
                    "cp: {} is a directory (not copied), please use --recursive option\n",
                    cloud_url.object
                ));
            }
        }

        Ok(())
    }

    fn check_copy_self(&self, source: &StorageUrl, target: &StorageUrl) -> Result<(), String> {
        let (StorageUrl::Cloud(source), StorageUrl::Cloud(target)) = (source, target) else {
            return Ok(());
        };
        if source.bucket != target.bucket {
            return Ok(());
        }

        let source_prefix = &source.object;
        let target_prefix = &target.object;
        if source_prefix == target_prefix {
            return Err(format!(
                "\"{source}\" and \"{target}\" are the same, copy self will do nothing\n"
            ));
        }
        if self.recursive {
            if target_prefix.starts_with(source_prefix.as_str()) {
                return Err(format!(
                    "\"{target}\" include \"{source}\", it's not allowed, recursively copy should be avoided\n"
                ));
            }
            if source_prefix.starts_with(target_prefix.as_str()) {
                return Err(format!(
                    "\"{source}\" include \"{target}\", it's not allowed, recover source object should be avoided\n"
                ));
            }
        }

        Ok(())
    }

    // A directory upload or a recursive copy writes below the target prefix.
    fn adjust_target(
        &self,
        operation: TransferOperation,
        source: &StorageUrl,
        target: StorageUrl,
    ) -> Result<StorageUrl, String> {
        let StorageUrl::Cloud(cloud_url) = &target else {
            return Ok(target);
        };

        let writes_below_prefix = match (operation, source) {
            (TransferOperation::Upload, StorageUrl::File(file_url)) => {
                let path = Path::new(&file_url.path);
                if !path.exists() {
                    return Err(format!("source path not found: {}\n", file_url.path));
                }
                if path.is_dir() && !self.recursive {
                    return Err(format!(
                        "source URL:{} include directories, please use --recursive option\n",
                        file_url.path
                    ));
                }
                path.is_dir()
            }
            (TransferOperation::Copy, _) => self.recursive,
            _ => false,
        };

        if writes_below_prefix && !cloud_url.object.is_empty() && !cloud_url.object.ends_with('/')
        {
            let object = format!("{}/", cloud_url.object);
            return Ok(StorageUrl::Cloud(cloud_url.with_object(&object)));
        }

        Ok(target)
    }
}

impl RemoveArgs {
    fn validate_remove_config(&self, target: &CloudUrl) -> Result<(), String> {
        target.check_bucket().map_err(with_newline)?;
        if self.recursive {
            target.check_object_prefix().map_err(with_newline)?;
        }

        if !self.recursive && (!self.include.is_empty() || !self.exclude.is_empty()) {
            return Err(FILTER_REQUIRES_RECURSIVE.to_string());
        }

        self.check_bucket_option(target)
    }

    fn check_bucket_option(&self, target: &CloudUrl) -> Result<(), String> {
        if self.recursive {
            return Ok(());
        }

        if !self.bucket {
            if target.object.is_empty() {
                return Err(format!(
                    "remove bucket, miss --bucket option, if you mean remove object, invalid url: {}, miss object\n",
                    self.target
                ));
            }
            return Ok(());
        }

        if self.multipart || self.all_type {
            if target.object.is_empty() {
                return Err(REMOVE_BUCKET_REDUNDANT_OPTION.to_string());
            }
            return Err(REMOVE_OBJECT_REDUNDANT_OPTION.to_string());
        }
        if !target.object.is_empty() {
            return Err(format!(
                "remove bucket invalid url: {}, object not empty, if you mean remove object, you should not use --bucket option\n",
                self.target
            ));
        }

        Ok(())
    }
}

impl TryFrom<CopyArgs> for CopyConfig {
    type Error = String;

    fn try_from(value: CopyArgs) -> Result<Self, Self::Error> {
        let encoding_type = parse_encoding_type(&value.encoding_type);
        let source = StorageUrl::parse(&value.source, encoding_type).map_err(with_newline)?;
        let target = StorageUrl::parse(&value.target, encoding_type).map_err(with_newline)?;

        let operation = value.validate_copy_config(&source, &target)?;
        let target = value.adjust_target(operation, &source, target)?;

        let multipart_threshold =
            human_bytes::parse_human_bytes_without_limit(&value.bigfile_threshold)?;
        let part_size = value
            .part_size
            .as_deref()
            .map(human_bytes::parse_part_size)
            .transpose()?;

        let filter_config = build_filter_config(
            &value.include,
            &value.exclude,
            value.start_time,
            value.end_time,
        )?;

        Ok(CopyConfig {
            source,
            target,
            operation,
            recursive: value.recursive,
            force: value.force,
            update: value.update,
            only_current_dir: value.only_current_dir,
            disable_dir_object: value.disable_dir_object,
            disable_ignore_error: value.disable_ignore_error,
            follow_symlinks: value.enable_symlink_dir,
            worker_size: value.routines,
            transfer_config: TransferConfig {
                multipart_threshold,
                part_size,
                parallel: value.parallel,
            },
            checkpoint_dir: value.checkpoint_dir,
            snapshot_path: value.snapshot_path,
            range: value.range,
            output_dir: value.output_dir,
            filter_config,
            force_retry_config: ForceRetryConfig {
                force_retry_count: value.retry_times,
                force_retry_interval_milliseconds: value.retry_interval_milliseconds,
            },
            encoding_type,
        })
    }
}

impl TryFrom<RemoveArgs> for RemoveConfig {
    type Error = String;

    fn try_from(value: RemoveArgs) -> Result<Self, Self::Error> {
        let encoding_type = parse_encoding_type(&value.encoding_type);
        let target = CloudUrl::parse(&value.target, encoding_type).map_err(with_newline)?;

        value.validate_remove_config(&target)?;

        let filter_config = build_filter_config(&value.include, &value.exclude, None, None)?;

        Ok(RemoveConfig {
            target,
            recursive: value.recursive,
            force: value.force,
            bucket: value.bucket,
            multipart: value.multipart,
            all_type: value.all_type,
            all_versions: value.all_versions,
            worker_size: value.routines,
            filter_config,
            force_retry_config: ForceRetryConfig {
                force_retry_count: value.retry_times,
                force_retry_interval_milliseconds: value.retry_interval_milliseconds,
            },
            encoding_type,
        })
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(value: CLIArgs) -> Result<Self, Self::Error> {
        let tracing_config = value.verbosity.log_level().map(|log_level| TracingConfig {
            tracing_level: log_level,
            json_tracing: value.json_tracing,
            span_events_tracing: value.span_events_tracing,
            disable_color_tracing: value.disable_color_tracing,
        });

        let command = match value.command {
            Some(Commands::Cp(copy_args)) => CommandConfig::Copy(CopyConfig::try_from(copy_args)?),
            Some(Commands::Rm(remove_args)) => {
                CommandConfig::Remove(RemoveConfig::try_from(remove_args)?)
            }
            None => return Err(NO_SUBCOMMAND_SPECIFIED.to_string()),
        };

        Ok(Config {
            command,
            storage_root: value.storage_root,
            max_keys: value.max_keys,
            tracing_config,
            confirm_callback: None,
        })
    }
}

fn parse_encoding_type(encoding_type: &Option<String>) -> EncodingType {
    match encoding_type.as_deref() {
        Some("url") => EncodingType::Url,
        _ => EncodingType::None,
    }
}

fn build_filter_config(
    include: &[String],
    exclude: &[String],
    start_time: Option<i64>,
    end_time: Option<i64>,
) -> Result<FilterConfig, String> {
    let mut rules = vec![];
    for pattern in include {
        rules.push(FilterRule::include(pattern).map_err(|e| format!("{e}\n"))?);
    }
    for pattern in exclude {
        rules.push(FilterRule::exclude(pattern).map_err(|e| format!("{e}\n"))?);
    }

    Ok(FilterConfig {
        rules: FilterRules::new(rules),
        start_time: start_time.map(parse_unix_time).transpose()?,
        end_time: end_time.map(parse_unix_time).transpose()?,
    })
}

fn parse_unix_time(seconds: i64) -> Result<DateTime<Utc>, String> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| INVALID_UNIX_TIME.to_string())
}

fn with_newline(message: String) -> String {
    format!("{message}\n")
}
