//! Worker-to-zone assignment types

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Worker or zone code -> database identifier
pub type ReferenceMap = HashMap<String, i32>;

/// (worker_id, effective_date) pair already present in storage
pub type AssignmentKey = (i32, NaiveDate);

/// Snapshot of committed assignments used as a conflict filter
pub type ExistingAssignments = HashSet<AssignmentKey>;

/// One data line of an uploaded CSV file, exactly as it was read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub worker_code: String,
    pub zone_code: String,
    pub assignment_date: String,
}

impl AssignmentRecord {
    pub fn new(
        worker_code: impl Into<String>,
        zone_code: impl Into<String>,
        assignment_date: impl Into<String>,
    ) -> Self {
        Self {
            worker_code: worker_code.into(),
            zone_code: zone_code.into(),
            assignment_date: assignment_date.into(),
        }
    }
}

/// Validated assignment, ready for the bulk load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub worker_id: i32,
    pub zone_id: i32,
    pub effective_date: NaiveDate,
}

/// Both lookup tables, loaded once per upload
#[derive(Debug, Clone, Default)]
pub struct ReferenceMaps {
    pub workers: ReferenceMap,
    pub zones: ReferenceMap,
}

/// Error slot on a rejected row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorField {
    WorkerCode,
    ZoneCode,
    EffectiveDate,
    RowError,
}

/// A rejected row: its 1-based position, original data, and one message per field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub row_number: usize,
    pub data: AssignmentRecord,
    pub error: BTreeMap<ErrorField, String>,
}

/// Outcome recorded for an upload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    Saved,
    Rejected,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Saved => "Saved",
            UploadStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit row persisted once per upload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadAudit {
    pub file_name: String,
    pub status: UploadStatus,
    pub uploaded_at: DateTime<Utc>,
}

impl UploadAudit {
    pub fn now(file_name: impl Into<String>, status: UploadStatus) -> Self {
        Self {
            file_name: file_name.into(),
            status,
            uploaded_at: Utc::now(),
        }
    }
}
