//! NATS message handlers

pub mod ping;
pub mod upload;

use std::sync::Arc;

use anyhow::Result;
use async_nats::Client;
use sqlx::PgPool;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::services::store::{AssignmentStore, PgAssignmentStore};
use crate::services::upload_pipeline::UploadPipeline;

pub const PING_SUBJECT: &str = "assign.ping";
pub const UPLOAD_SUBJECT: &str = "assign.upload";

/// Start all message handlers; returns when one of them stops
pub async fn start_handlers(client: Client, pool: PgPool, config: &Config) -> Result<()> {
    info!("Starting message handlers...");

    let store: Arc<dyn AssignmentStore> = Arc::new(PgAssignmentStore::new(pool));
    info!("Assignment store initialized: {}", store.name());

    let pipeline = Arc::new(UploadPipeline::new(store, config.pipeline_options()));
    let shutdown = CancellationToken::new();

    let ping_sub = client.subscribe(PING_SUBJECT).await?;
    let upload_sub = client.subscribe(UPLOAD_SUBJECT).await?;
    info!("Subscribed to {}, {}", PING_SUBJECT, UPLOAD_SUBJECT);

    let client_ping = client.clone();
    let ping_handle = tokio::spawn(async move {
        ping::handle_ping(client_ping, ping_sub).await
    });

    let client_upload = client.clone();
    let upload_shutdown = shutdown.clone();
    let upload_handle = tokio::spawn(async move {
        upload::handle_upload(client_upload, upload_sub, pipeline, upload_shutdown).await
    });

    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = upload_handle => {
            error!("Upload handler finished: {:?}", result);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, cancelling in-flight uploads");
            shutdown.cancel();
        }
    }

    Ok(())
}
