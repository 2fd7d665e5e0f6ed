//! Upload handler: CSV assignment files over NATS request/reply

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use base64::Engine;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::UploadError;
use crate::services::upload_pipeline::UploadPipeline;
use crate::types::{ErrorResponse, Request, SuccessResponse, UploadRequest, UploadResponse};

/// Handle assign.upload messages.
///
/// Uploads are processed one at a time per subscriber so that bulk loads
/// never compete for the same transaction.
pub async fn handle_upload(
    client: Client,
    mut subscriber: Subscriber,
    pipeline: Arc<UploadPipeline>,
    shutdown: CancellationToken,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received assign.upload message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        // Parse request
        let request: Request<UploadRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let content = match base64::engine::general_purpose::STANDARD.decode(&request.payload.content) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Upload '{}' is not valid base64: {}", request.payload.file_name, e);
                let error = ErrorResponse::new(request.id, "INVALID_REQUEST", "content must be base64");
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let cancel = shutdown.child_token();
        let result = pipeline
            .process(&request.payload.file_name, &content, &cancel)
            .await;

        let response = upload_reply(request.id, result)?;
        let _ = client.publish(reply, response.into()).await;
    }

    Ok(())
}

/// Serialize the pipeline outcome into the reply body
pub fn upload_reply(request_id: Uuid, result: Result<u64, UploadError>) -> Result<Vec<u8>> {
    let body = match result {
        Ok(processed) => {
            serde_json::to_vec(&SuccessResponse::new(request_id, UploadResponse::processed(processed)))?
        }
        Err(UploadError::Rejected(errors)) => {
            let details = serde_json::to_value(&errors)?;
            let error = ErrorResponse::new(request_id, "VALIDATION_FAILED", format!("{} row(s) failed validation", errors.len()))
                .with_details(details);
            serde_json::to_vec(&error)?
        }
        Err(e) => serde_json::to_vec(&ErrorResponse::new(request_id, e.code(), e.to_string()))?,
    };
    Ok(body)
}
