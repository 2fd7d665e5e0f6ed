//! Upload request/response payloads

use serde::{Deserialize, Serialize};

/// Request to ingest one CSV file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: String,
    /// Base64-encoded file content
    pub content: String,
}

/// Successful upload confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub processed_count: u64,
    pub message: String,
}

impl UploadResponse {
    pub fn processed(processed_count: u64) -> Self {
        Self {
            processed_count,
            message: "File processed successfully".to_string(),
        }
    }
}
