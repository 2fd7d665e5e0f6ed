//! Row validation for assignment uploads
//!
//! Every row is checked independently against the reference maps and the
//! existing-assignment snapshot. Rows are fanned out over a fixed number of
//! worker threads; the only shared mutable state is [`FirstOccurrence`], which
//! records the earliest row for each (worker code, date) key.
//!
//! Validation runs in two passes separated by a join:
//! 1. field checks, plus registering each future-dated row's duplicate key
//! 2. duplicate and conflict checks, which need the completed registry
//!
//! The join makes "first occurrence" mean first in file order regardless of
//! thread scheduling.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::debug;

use crate::types::{
    AssignmentRecord, ErrorField, ExistingAssignments, ReferenceMap, ReferenceMaps,
    ValidationError,
};

/// Maximum length of worker and zone codes, in characters
pub const MAX_CODE_LENGTH: usize = 10;

pub const MSG_DUPLICATE_ROW: &str = "Duplicate row in file.";
pub const MSG_ALREADY_EXISTS: &str = "Assignment already exists in worker_zone_assignment table.";
pub const MSG_INVALID_DATE: &str = "Invalid date format.";
pub const MSG_DATE_NOT_FUTURE: &str = "Effective Date must be in the future.";

/// Rows per thread below which validation stays on the calling thread
const MIN_ROWS_PER_WORKER: usize = 256;

/// Parse a `YYYY-MM-DD` date, rejecting anything but the exact 10-char shape.
pub fn parse_effective_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let digits_ok = bytes
        .iter()
        .enumerate()
        .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !digits_ok {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

type DuplicateKey = (String, NaiveDate);

/// Concurrent registry of the earliest row seen for each duplicate key.
///
/// `claim` is an atomic insert-if-absent that also lowers the stored row when a
/// smaller index arrives late, so the final owner is independent of ordering.
#[derive(Default)]
pub struct FirstOccurrence {
    rows: Mutex<HashMap<DuplicateKey, usize>>,
}

impl FirstOccurrence {
    /// Register `row` for `key`. Returns true if `row` is the earliest seen so far.
    pub fn claim(&self, key: DuplicateKey, row: usize) -> bool {
        let mut rows = self.rows.lock();
        match rows.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(row);
                true
            }
            Entry::Occupied(mut slot) => {
                if row < *slot.get() {
                    slot.insert(row);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Whether `row` owns `key` once all claims are in
    pub fn is_first(&self, key: &DuplicateKey, row: usize) -> bool {
        self.rows.lock().get(key).map_or(true, |first| *first == row)
    }
}

/// Outcome of the first pass for one row
struct FieldCheck {
    errors: BTreeMap<ErrorField, String>,
    worker_id: Option<i32>,
    effective_date: Option<NaiveDate>,
    duplicate_key: Option<DuplicateKey>,
}

/// Validates upload rows against one consistent snapshot
pub struct RowValidator<'a> {
    maps: &'a ReferenceMaps,
    existing: &'a ExistingAssignments,
    today: NaiveDate,
    workers: usize,
}

impl<'a> RowValidator<'a> {
    /// `today` is fixed for the whole batch; dates must be strictly after it.
    pub fn new(maps: &'a ReferenceMaps, existing: &'a ExistingAssignments, today: NaiveDate) -> Self {
        Self {
            maps,
            existing,
            today,
            workers: 1,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Validate every row. Returns one entry per invalid row, sorted by row number;
    /// an empty result means the whole batch is valid.
    pub fn validate(&self, records: &[AssignmentRecord]) -> Vec<ValidationError> {
        let seen = FirstOccurrence::default();

        let checks = fan_out(records, self.workers, |index, record| {
            self.check_fields(index, record, &seen)
        });

        let outcomes = fan_out(&checks, self.workers, |index, check| {
            self.check_row(index, check, &seen)
        });

        let errors: Vec<ValidationError> = outcomes
            .into_iter()
            .zip(records)
            .enumerate()
            .filter(|(_, (error, _))| !error.is_empty())
            .map(|(index, (error, record))| ValidationError {
                row_number: index + 1,
                data: record.clone(),
                error,
            })
            .collect();

        debug!(
            "Validated {} rows with {} workers: {} invalid",
            records.len(),
            self.workers,
            errors.len()
        );

        errors
    }

    fn check_fields(&self, index: usize, record: &AssignmentRecord, seen: &FirstOccurrence) -> FieldCheck {
        let mut errors = BTreeMap::new();

        let worker_id = match check_code(&record.worker_code, "Worker Code", &self.maps.workers) {
            Ok(id) => Some(id),
            Err(message) => {
                errors.insert(ErrorField::WorkerCode, message);
                None
            }
        };

        if let Err(message) = check_code(&record.zone_code, "Zone Code", &self.maps.zones) {
            errors.insert(ErrorField::ZoneCode, message);
        }

        let effective_date = parse_effective_date(&record.assignment_date);
        let mut duplicate_key = None;
        match effective_date {
            None => {
                errors.insert(ErrorField::EffectiveDate, MSG_INVALID_DATE.to_string());
            }
            Some(date) if date <= self.today => {
                errors.insert(ErrorField::EffectiveDate, MSG_DATE_NOT_FUTURE.to_string());
            }
            Some(date) => {
                let key = (record.worker_code.clone(), date);
                seen.claim(key.clone(), index);
                duplicate_key = Some(key);
            }
        }

        FieldCheck {
            errors,
            worker_id,
            effective_date,
            duplicate_key,
        }
    }

    fn check_row(&self, index: usize, check: &FieldCheck, seen: &FirstOccurrence) -> BTreeMap<ErrorField, String> {
        let mut errors = check.errors.clone();

        if let Some(key) = &check.duplicate_key {
            if !seen.is_first(key, index) {
                errors.insert(ErrorField::RowError, MSG_DUPLICATE_ROW.to_string());
            }
        }

        // Shares the RowError slot with the duplicate flag and takes precedence
        if let (Some(worker_id), Some(date)) = (check.worker_id, check.effective_date) {
            if self.existing.contains(&(worker_id, date)) {
                errors.insert(ErrorField::RowError, MSG_ALREADY_EXISTS.to_string());
            }
        }

        errors
    }
}

/// Required -> length -> existence, first failure only
fn check_code(code: &str, label: &str, map: &ReferenceMap) -> Result<i32, String> {
    if code.is_empty() {
        return Err(format!("{} is required.", label));
    }
    if code.chars().count() > MAX_CODE_LENGTH {
        return Err(format!("{} exceeds {} characters.", label, MAX_CODE_LENGTH));
    }
    map.get(code)
        .copied()
        .ok_or_else(|| format!("{} does not exist.", label))
}

/// Apply `f` to every item across up to `workers` scoped threads, keeping input order.
fn fan_out<T, R, F>(items: &[T], workers: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync,
{
    let workers = workers.min(items.len() / MIN_ROWS_PER_WORKER).max(1);
    if workers == 1 {
        return items.iter().enumerate().map(|(i, item)| f(i, item)).collect();
    }

    let chunk_size = items.len().div_ceil(workers);
    let f = &f;
    std::thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks(chunk_size)
            .enumerate()
            .map(|(chunk_index, chunk)| {
                let offset = chunk_index * chunk_size;
                scope.spawn(move || {
                    chunk
                        .iter()
                        .enumerate()
                        .map(|(i, item)| f(offset + i, item))
                        .collect::<Vec<R>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(results) => results,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}
