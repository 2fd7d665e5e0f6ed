//! NATS message types

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Generic request wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

/// Generic success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(request_id: Uuid, payload: T) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(request_id: Uuid, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Attach a structured payload (e.g. per-row validation errors)
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_omits_empty_details() {
        let response = ErrorResponse::new(Uuid::nil(), "INVALID_FILE", "No file uploaded.");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("INVALID_FILE"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_error_response_with_details_serializes_them() {
        let response = ErrorResponse::new(Uuid::nil(), "VALIDATION_FAILED", "rejected")
            .with_details(serde_json::json!([{ "rowNumber": 2 }]));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["details"][0]["rowNumber"], 2);
    }

    #[test]
    fn test_request_parses_camel_case_envelope() {
        let raw = r#"{
            "id": "00000000-0000-0000-0000-000000000000",
            "timestamp": "2026-01-01T00:00:00Z",
            "payload": { "value": 1 }
        }"#;
        let request: Request<serde_json::Value> = serde_json::from_str(raw).unwrap();
        assert_eq!(request.id, Uuid::nil());
        assert_eq!(request.payload["value"], 1);
    }
}
