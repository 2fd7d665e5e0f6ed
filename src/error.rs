//! Upload error taxonomy

use thiserror::Error;

use crate::types::ValidationError;

/// Malformed upload, rejected before any database access
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("No file uploaded.")]
    EmptyFile,

    #[error("File exceeds maximum allowed size.")]
    TooLarge { size: usize, max: usize },

    #[error("Invalid file format")]
    Malformed(String),

    #[error("Maximum {} rows allowed", group_thousands(.max))]
    TooManyRows { max: usize },
}

/// Terminal failure of one upload
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("{} row(s) failed validation", .0.len())]
    Rejected(Vec<ValidationError>),

    #[error("Processing error")]
    Infrastructure(#[from] anyhow::Error),

    /// Reported to callers exactly like an infrastructure failure
    #[error("Processing error")]
    Cancelled,
}

/// `50000` -> `50,000`
fn group_thousands(n: &usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

impl UploadError {
    /// Reply code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::Input(_) => "INVALID_FILE",
            UploadError::Rejected(_) => "VALIDATION_FAILED",
            UploadError::Infrastructure(_) | UploadError::Cancelled => "PROCESSING_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_messages() {
        assert_eq!(InputError::EmptyFile.to_string(), "No file uploaded.");
        assert_eq!(
            InputError::TooManyRows { max: 50_000 }.to_string(),
            "Maximum 50,000 rows allowed"
        );
        assert_eq!(
            InputError::Malformed("missing field".into()).to_string(),
            "Invalid file format"
        );
    }

    #[test]
    fn test_infrastructure_errors_are_opaque() {
        let err = UploadError::from(anyhow::anyhow!("connection refused on 10.0.0.1"));
        assert_eq!(err.to_string(), "Processing error");
        assert_eq!(err.code(), "PROCESSING_ERROR");
    }

    #[test]
    fn test_codes() {
        assert_eq!(UploadError::from(InputError::EmptyFile).code(), "INVALID_FILE");
        assert_eq!(UploadError::Rejected(vec![]).code(), "VALIDATION_FAILED");
        assert_eq!(UploadError::Cancelled.code(), "PROCESSING_ERROR");
    }

    #[test]
    fn test_row_cap_message_groups_thousands() {
        assert_eq!(InputError::TooManyRows { max: 999 }.to_string(), "Maximum 999 rows allowed");
        assert_eq!(InputError::TooManyRows { max: 1_000 }.to_string(), "Maximum 1,000 rows allowed");
        assert_eq!(
            InputError::TooManyRows { max: 1_234_567 }.to_string(),
            "Maximum 1,234,567 rows allowed"
        );
    }

    #[test]
    fn test_cancellation_is_as_opaque_as_infrastructure_failure() {
        assert_eq!(UploadError::Cancelled.to_string(), "Processing error");
    }
}
