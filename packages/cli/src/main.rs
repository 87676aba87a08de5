mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use api::{ApiError, ImageApi, ImageJob, SubmitRequest};
use clap::Parser;
use cli::{Cli, Command};
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] api::ConfigError),

    #[error(transparent)]
    Init(#[from] api::InitError),

    #[error("{} (status {})", .0, .0.status_code())]
    Api(#[from] ApiError),

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Command) -> Result<(), CliError> {
    let config = api::AppConfig::from_env()?;
    let api = api::init_image_api(config).await?;

    let result = match command {
        Command::Submit { files, mode, sync } => submit(&api, &files, mode.as_str(), sync).await,
        Command::Status { id } => print_json(&api.status(&id).await?),
        Command::List { limit } => print_json(&api.list(limit).await?),
        Command::Delete { id } => print_json(&api.delete(&id).await?),
    };
    api.shutdown();
    result
}

async fn submit(
    api: &ImageApi,
    files: &[PathBuf],
    mode: &str,
    sync: bool,
) -> Result<(), CliError> {
    let mut submitted = Vec::with_capacity(files.len());
    for file in files {
        let path = file.as_path();
        let bytes = tokio::fs::read(path).await.map_err(|source| CliError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let request = SubmitRequest::new(bytes, mime_for(path))
            .with_filename(filename)
            .with_mode(mode)
            .sync(sync);
        let response = api.submit(request).await?;
        match (response.cached, response.queue_depth) {
            (Some(true), _) => {
                tracing::info!("{}: cached as job {}", path.display(), response.job.id)
            }
            (_, Some(depth)) => tracing::info!(
                "{}: queued as job {} (depth {})",
                path.display(),
                response.job.id,
                depth
            ),
            _ => {}
        }
        submitted.push(response);
    }

    // Every job is queued before we start waiting, so they run side by side.
    for mut response in submitted {
        if !response.job.status.is_terminal() {
            response.job = wait_terminal(api, &response.job).await?;
        }
        print_json(&response)?;
    }
    Ok(())
}

async fn wait_terminal(api: &ImageApi, job: &ImageJob) -> Result<ImageJob, CliError> {
    let id = job.id.to_string();
    loop {
        let current = api.status(&id).await?;
        if current.status.is_terminal() {
            return Ok(current);
        }
        tracing::debug!("Job {} at {}", id, current.step);
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
