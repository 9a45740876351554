use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const REPORT_PREFIX: &str = "ossbulk_report_";
const REPORT_SUFFIX: &str = ".report";

#[derive(Debug)]
struct ReportState {
    file: Option<tokio::fs::File>,
    created_dir: bool,
    first_error: Option<String>,
    prompted: bool,
}

/// Side file listing the items of a batch that failed.
///
/// The file is created with the first failure, so a batch without failures leaves nothing
/// behind.
#[derive(Debug)]
pub struct ReportSink {
    output_dir: PathBuf,
    path: PathBuf,
    comment: String,
    state: Mutex<ReportState>,
}

impl ReportSink {
    pub fn new(output_dir: &Path, comment: &str) -> Self {
        let file_name = format!(
            "{REPORT_PREFIX}{}{REPORT_SUFFIX}",
            Local::now().format("%Y%m%d_%H%M%S")
        );

        Self {
            output_dir: output_dir.to_path_buf(),
            path: output_dir.join(file_name),
            comment: comment.to_string(),
            state: Mutex::new(ReportState {
                file: None,
                created_dir: false,
                first_error: None,
                prompted: false,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends an `[Error]` line for one failed item.
    pub async fn report_error(&self, message: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.file.is_none() {
            state.created_dir = !tokio::fs::try_exists(&self.output_dir)
                .await
                .unwrap_or(false);
            tokio::fs::create_dir_all(&self.output_dir)
                .await
                .with_context(|| {
                    format!("failed to create output dir: {}", self.output_dir.display())
                })?;

            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .with_context(|| format!("create reporter file error: {}", self.path.display()))?;
            file.write_all(format!("# {}\n", self.comment).as_bytes())
                .await
                .context("failed to write report.")?;
            state.file = Some(file);

            let path = self.path.to_string_lossy().to_string();
            debug!(path = path, "report file created.");
        }

        let line = format!(
            "[Error] {} {message}\n",
            Local::now().format("%Y/%m/%d %H:%M:%S")
        );
        if let Some(file) = state.file.as_mut() {
            file.write_all(line.as_bytes())
                .await
                .context("failed to write report.")?;
            file.flush().await.context("failed to flush report.")?;
        }
        if state.first_error.is_none() {
            state.first_error = Some(message.to_string());
        }

        Ok(())
    }

    /// The message pointing the user at the report. Only the first call returns it.
    pub async fn prompt(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        if state.prompted {
            return None;
        }
        let first_error = state.first_error.clone()?;
        state.prompted = true;

        Some(format!(
            "Error occurs, message: {first_error}. See more information in file: {}",
            self.path.display()
        ))
    }

    /// Closes the file. Removes an output dir this sink created if nothing was reported.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut file) = state.file.take() {
            if let Err(e) = file.flush().await {
                let error = e.to_string();
                warn!(error = error, "failed to flush report.");
            }
            return;
        }

        if state.created_dir {
            let _ = tokio::fs::remove_dir(&self.output_dir).await;
        }
    }
}
