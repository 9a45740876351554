use std::path::PathBuf;

use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, error, warn};

use ossbulk::Config;
use ossbulk::config::CommandConfig;
use ossbulk::types::PipelineCancellationToken;

/// Turns the first Ctrl-C into a cancellation of the running batch.
///
/// Items already being transferred finish, so interrupted multipart transfers keep their
/// checkpoints and the next `cp` with the same arguments continues them.
pub struct CtrlCHandler {
    cancellation_token: PipelineCancellationToken,
    checkpoint_dir: Option<PathBuf>,
}

impl CtrlCHandler {
    pub fn new(config: &Config, cancellation_token: PipelineCancellationToken) -> Self {
        let checkpoint_dir = match &config.command {
            CommandConfig::Copy(copy_config) => Some(copy_config.checkpoint_dir.clone()),
            CommandConfig::Remove(_) => None,
        };
        Self {
            cancellation_token,
            checkpoint_dir,
        }
    }

    /// The handler ends when the batch is cancelled for any reason.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            select! {
                _ = self.cancellation_token.cancelled() => {
                    debug!("batch cancelled, ctrl-c handler stopped.");
                }
                result = signal::ctrl_c() => {
                    match result {
                        Ok(()) => self.interrupt(),
                        Err(e) => {
                            let error = e.to_string();
                            error!(error = error, "failed to listen for ctrl-c.");
                        }
                    }
                }
            }
        })
    }

    fn interrupt(&self) {
        match &self.checkpoint_dir {
            Some(checkpoint_dir) => {
                let checkpoint_dir = checkpoint_dir.to_string_lossy().to_string();
                warn!(
                    checkpoint_dir = checkpoint_dir,
                    "ctrl-c received, waiting for in-flight items. Run the same command again to resume."
                );
            }
            None => warn!("ctrl-c received, waiting for in-flight items."),
        }
        self.cancellation_token.cancel();
    }
}
