//! PostgreSQL binary COPY encoding for assignment rows
//!
//! Layout written by [`BinaryCopyEncoder`]:
//! - header: 11-byte signature, int32 flags (0), int32 extension length (0)
//! - per row: int16 field count, then int32 length + big-endian value per field
//! - trailer: int16 -1

use chrono::NaiveDate;

use crate::types::Assignment;

pub const PGCOPY_SIGNATURE: &[u8; 11] = b"PGCOPY\n\xff\r\n\0";

const FIELD_COUNT: i16 = 3;
const INT4_LEN: i32 = 4;
const DATE_LEN: i32 = 4;
const TRAILER: i16 = -1;

/// Days between 0001-01-01 (CE day 1) and 2000-01-01, the PostgreSQL date epoch
const PG_EPOCH_DAYS_FROM_CE: i32 = 730_120;

/// Encode a date as PostgreSQL's int32 day offset from 2000-01-01
pub fn pg_date_days(date: NaiveDate) -> i32 {
    use chrono::Datelike;
    date.num_days_from_ce() - PG_EPOCH_DAYS_FROM_CE
}

/// Incremental encoder; drain with [`take_buffer`](Self::take_buffer) to stream chunks.
pub struct BinaryCopyEncoder {
    buf: Vec<u8>,
    rows: usize,
}

impl BinaryCopyEncoder {
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(64 * 1024);
        buf.extend_from_slice(PGCOPY_SIGNATURE);
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf.extend_from_slice(&0i32.to_be_bytes());
        Self { buf, rows: 0 }
    }

    pub fn push(&mut self, assignment: &Assignment) {
        self.buf.extend_from_slice(&FIELD_COUNT.to_be_bytes());

        self.buf.extend_from_slice(&INT4_LEN.to_be_bytes());
        self.buf.extend_from_slice(&assignment.worker_id.to_be_bytes());

        self.buf.extend_from_slice(&INT4_LEN.to_be_bytes());
        self.buf.extend_from_slice(&assignment.zone_id.to_be_bytes());

        self.buf.extend_from_slice(&DATE_LEN.to_be_bytes());
        self.buf.extend_from_slice(&pg_date_days(assignment.effective_date).to_be_bytes());

        self.rows += 1;
    }

    /// Rows encoded so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Hand out everything encoded since the last call
    pub fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Append the trailer and return the remaining bytes
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.extend_from_slice(&TRAILER.to_be_bytes());
        self.buf
    }
}

impl Default for BinaryCopyEncoder {
    fn default() -> Self {
        Self::new()
    }
}
