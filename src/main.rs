//! Assignment Worker - bulk worker-to-zone assignment uploads
//!
//! This worker connects to NATS and validates/loads uploaded CSV files.

mod cli;
mod config;
mod db;
mod error;
mod handlers;
mod services;
mod types;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::services::store::{AssignmentStore, PgAssignmentStore};
use crate::services::upload_pipeline::UploadPipeline;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs directory - use LOGS_DIR env var or default to ../logs (relative to worker)
    let logs_dir = std::env::var("LOGS_DIR")
        .unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &logs_dir,
        "worker.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,assignment_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))  // stderr keeps stdout for `upload` output
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))  // file
        .init();

    let config = Config::from_env()?;
    info!("Configuration loaded");

    match cli.command {
        None | Some(Command::Serve) => serve(config).await.map(|_| ExitCode::SUCCESS),
        Some(Command::Migrate) => {
            let pool = db::create_pool(&config.database_url, config.db_max_connections, config.db_timeout).await?;
            db::run_migrations(&pool).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Upload { path, file_name }) => upload_file(config, path, file_name).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Assignment Worker...");

    let pool = db::create_pool(&config.database_url, config.db_max_connections, config.db_timeout).await?;
    info!("Connected to PostgreSQL");

    db::run_migrations(&pool).await?;

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (std::env::var("NATS_USER"), std::env::var("NATS_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    if let Err(e) = handlers::start_handlers(nats_client, pool, &config).await {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}

async fn upload_file(config: Config, path: std::path::PathBuf, file_name: Option<String>) -> Result<ExitCode> {
    let content = tokio::fs::read(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = file_name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    });

    let pool = db::create_pool(&config.database_url, config.db_max_connections, config.db_timeout).await?;
    let store: Arc<dyn AssignmentStore> = Arc::new(PgAssignmentStore::new(pool));
    let pipeline = UploadPipeline::new(store, config.pipeline_options());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let result = pipeline.process(&file_name, &content, &cancel).await;
    let succeeded = result.is_ok();
    let body = handlers::upload::upload_reply(uuid::Uuid::new_v4(), result)?;
    println!("{}", String::from_utf8_lossy(&body));

    Ok(if succeeded { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
