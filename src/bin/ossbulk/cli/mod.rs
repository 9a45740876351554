use std::io;
use std::io::{IsTerminal, Write};

use anyhow::{Context, Result, anyhow};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{error, trace};

use ossbulk::Config;
use ossbulk::config::{CommandConfig, ConfirmCallback};
use ossbulk::monitor::ExitStatus;
use ossbulk::pipeline::Pipeline;
use ossbulk::types::{PipelineCancellationToken, create_pipeline_cancellation_token};

mod ctrl_c_handler;
mod indicator;
mod ui_config;

use ctrl_c_handler::CtrlCHandler;

const OPERATION_CANCELED: &str = "operation is canceled.";

pub async fn run(mut config: Config) -> Result<()> {
    if !confirm_removal(&config).await? {
        println!("{OPERATION_CANCELED}");
        return Ok(());
    }

    if is_overwrite_confirmation_needed(&config) && io::stdin().is_terminal() {
        config.confirm_callback = Some(ConfirmCallback::new(ask_user));
    }

    let cancellation_token = create_pipeline_cancellation_token();
    let ctrl_c_handler = CtrlCHandler::new(&config, cancellation_token.clone()).spawn();

    let result = run_pipeline(config, cancellation_token).await;
    ctrl_c_handler.abort();
    result
}

async fn run_pipeline(config: Config, cancellation_token: PipelineCancellationToken) -> Result<()> {
    let start_time = Instant::now();
    trace!("pipeline start.");

    let mut pipeline = Pipeline::new(config.clone(), cancellation_token.clone());
    let (finished_sender, finished_receiver) = oneshot::channel();
    let indicator_join_handle = indicator::show_indicator(
        pipeline.monitor(),
        finished_receiver,
        ui_config::is_progress_indicator_needed(&config),
        ui_config::is_show_result_needed(&config),
    );

    pipeline.run().await;

    let exit_status = if pipeline.has_error() || cancellation_token.is_cancelled() {
        ExitStatus::Error
    } else {
        ExitStatus::Normal
    };
    let _ = finished_sender.send(exit_status);
    indicator_join_handle.await?;

    if let Some(prompt) = pipeline.report_prompt().await {
        println!("{prompt}");
    }

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());
    if pipeline.has_error() {
        error!(duration_sec = duration_sec, "ossbulk failed.");

        let first_error = pipeline
            .get_errors_and_consume()
            .and_then(|errors| errors.into_iter().next());
        return Err(first_error.unwrap_or_else(|| anyhow!("ossbulk failed.")));
    }
    if cancellation_token.is_cancelled() {
        return Err(anyhow!("ossbulk has been cancelled."));
    }

    trace!(duration_sec = duration_sec, "ossbulk has been completed.");
    Ok(())
}

fn is_overwrite_confirmation_needed(config: &Config) -> bool {
    match &config.command {
        CommandConfig::Copy(copy_config) => !copy_config.overwrite_decided(),
        CommandConfig::Remove(_) => false,
    }
}

// Every prompt a removal needs must be answered with `y` before any work starts.
async fn confirm_removal(config: &Config) -> Result<bool> {
    let CommandConfig::Remove(remove_config) = &config.command else {
        return Ok(true);
    };

    let prompts = [
        remove_config.confirmation_prompt(),
        remove_config.bucket_confirmation_prompt(),
    ];
    for prompt in prompts.into_iter().flatten() {
        let confirmed = tokio::task::spawn_blocking(move || ask_user(&prompt))
            .await
            .context("spawn_blocking() failed.")?;
        if !confirmed {
            return Ok(false);
        }
    }

    Ok(true)
}

fn ask_user(prompt: &str) -> bool {
    print!("{prompt}");
    let _ = io::stdout().flush();

    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    is_yes(&answer)
}

fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}
