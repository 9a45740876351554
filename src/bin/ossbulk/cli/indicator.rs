use std::io;
use std::io::Write;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use ossbulk::monitor::{ExitStatus, Monitor};

const REFRESH_INTERVAL: Duration = Duration::from_millis(200);

/// Renders the progress line of `monitor` until the batch reports how it ended through
/// `finished`, then prints the finish line.
pub fn show_indicator(
    monitor: Monitor,
    mut finished: oneshot::Receiver<ExitStatus>,
    show_progress: bool,
    show_result: bool,
) -> JoinHandle<()> {
    let progress_text = if show_progress {
        let progress_text = ProgressBar::new(0);
        if let Ok(progress_style) = ProgressStyle::with_template("{wide_msg}") {
            progress_text.set_style(progress_style);
        }
        progress_text
    } else {
        ProgressBar::hidden()
    };

    tokio::spawn(async move {
        let exit_status = loop {
            tokio::select! {
                result = &mut finished => {
                    // A dropped sender means the batch did not finish normally.
                    break result.unwrap_or(ExitStatus::Error);
                }
                _ = tokio::time::sleep(REFRESH_INTERVAL) => {
                    if let Some(line) = monitor.progress_line() {
                        progress_text.set_message(line);
                    }
                }
            }
        };

        progress_text.finish_and_clear();

        let Some(line) = monitor.finish_line(exit_status) else {
            return;
        };
        if show_result {
            println!("{line}");
            let _ = io::stdout().flush();
        }
    })
}
