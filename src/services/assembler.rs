//! Turns validated upload rows into insertable assignments

use crate::services::validator::parse_effective_date;
use crate::types::{Assignment, AssignmentRecord, ReferenceMaps};

/// Map records to [`Assignment`]s, substituting identifiers for codes.
///
/// Only called after validation returned no errors; rows that do not resolve
/// are skipped rather than reported.
pub fn assemble(records: &[AssignmentRecord], maps: &ReferenceMaps) -> Vec<Assignment> {
    records
        .iter()
        .filter_map(|record| {
            Some(Assignment {
                worker_id: *maps.workers.get(&record.worker_code)?,
                zone_id: *maps.zones.get(&record.zone_code)?,
                effective_date: parse_effective_date(&record.assignment_date)?,
            })
        })
        .collect()
}
