use eyre::Context;
use std::io::IsTerminal;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_s3_uploader::{Config, Pipeline};

/// Reads the invocation event from the file named on the command line, or from stdin.
async fn read_event() -> eyre::Result<serde_json::Value> {
    let raw = match std::env::args().nth(1) {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read event from {path}"))?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("read event from stdin")?;
            raw
        }
    };
    serde_json::from_str(&raw).context("parse event as JSON")
}

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    // stdout carries the response, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let config = Config::from_env().context("load configuration")?;
    let event = read_event().await?;
    let pipeline = Pipeline::from_config(config)
        .await
        .context("set up pipeline")?;

    let report = pipeline.handle(event).await;
    if let Some(webhook) = report.webhook {
        tracing::info!(
            attempted = webhook.attempted,
            succeeded = webhook.succeeded,
            status_code = ?webhook.status_code,
            "webhook outcome"
        );
    }

    println!(
        "{}",
        serde_json::to_string(&report.response).context("serialize response")?
    );
    Ok(if report.response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
