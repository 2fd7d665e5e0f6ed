//! CSV intake: size/row caps and parsing of the raw upload

use crate::error::InputError;
use crate::types::AssignmentRecord;

const REQUIRED_COLUMNS: [&str; 3] = ["worker_code", "zone_code", "assignment_date"];
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Hard caps enforced before any validation work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_bytes: usize,
    pub max_rows: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            // ~50 bytes per row at the row cap
            max_bytes: 50_000 * 50,
            max_rows: 50_000,
        }
    }
}

/// Check the caps and parse every data line into an [`AssignmentRecord`].
///
/// Records keep file order; position `i` is reported as row `i + 1`.
pub fn parse_upload(content: &[u8], limits: &UploadLimits) -> Result<Vec<AssignmentRecord>, InputError> {
    if content.is_empty() {
        return Err(InputError::EmptyFile);
    }

    if content.len() > limits.max_bytes {
        return Err(InputError::TooLarge {
            size: content.len(),
            max: limits.max_bytes,
        });
    }

    let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .flexible(false)
        .from_reader(content);

    let headers = reader
        .headers()
        .map_err(|e| InputError::Malformed(e.to_string()))?;
    if let Some(missing) = REQUIRED_COLUMNS
        .iter()
        .find(|column| !headers.iter().any(|h| h == **column))
    {
        return Err(InputError::Malformed(format!("missing column '{}'", missing)));
    }

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: AssignmentRecord = result.map_err(|e| InputError::Malformed(e.to_string()))?;
        if rows.len() == limits.max_rows {
            return Err(InputError::TooManyRows { max: limits.max_rows });
        }
        rows.push(row);
    }

    Ok(rows)
}
