//! Worker-zone assignment queries

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};
use tracing::debug;

use crate::db::copy::BinaryCopyEncoder;
use crate::types::{Assignment, AssignmentKey, ExistingAssignments};

const COPY_STATEMENT: &str =
    "COPY worker_zone_assignment (worker_id, zone_id, effective_date) FROM STDIN (FORMAT BINARY)";

/// Rows encoded per COPY data message
const COPY_CHUNK_ROWS: usize = 5_000;

/// Load every committed (worker_id, effective_date) pair
pub async fn load_all_existing(pool: &PgPool) -> Result<ExistingAssignments> {
    let rows: Vec<(i32, NaiveDate)> = sqlx::query_as(
        "SELECT worker_id, effective_date FROM worker_zone_assignment",
    )
    .fetch_all(pool)
    .await
    .context("failed to load existing assignments")?;

    Ok(rows.into_iter().collect())
}

/// Load only the committed pairs that match `keys`
pub async fn load_existing_for_keys(pool: &PgPool, keys: &[AssignmentKey]) -> Result<ExistingAssignments> {
    if keys.is_empty() {
        return Ok(ExistingAssignments::new());
    }

    let (worker_ids, dates): (Vec<i32>, Vec<NaiveDate>) = keys.iter().copied().unzip();

    let rows: Vec<(i32, NaiveDate)> = sqlx::query_as(
        r#"
        SELECT a.worker_id, a.effective_date
        FROM worker_zone_assignment a
        JOIN UNNEST($1::int4[], $2::date[]) AS k(worker_id, effective_date)
          ON a.worker_id = k.worker_id AND a.effective_date = k.effective_date
        "#,
    )
    .bind(worker_ids)
    .bind(dates)
    .fetch_all(pool)
    .await
    .context("failed to load matching assignments")?;

    Ok(rows.into_iter().collect())
}

/// Stream assignments into `worker_zone_assignment` over binary COPY.
///
/// Runs on the caller's connection so it joins the caller's transaction.
/// Returns the row count reported by the server.
pub async fn copy_assignments(conn: &mut PgConnection, assignments: &[Assignment]) -> Result<u64> {
    let mut copy = conn
        .copy_in_raw(COPY_STATEMENT)
        .await
        .context("failed to start COPY")?;

    let mut encoder = BinaryCopyEncoder::new();
    for chunk in assignments.chunks(COPY_CHUNK_ROWS) {
        chunk.iter().for_each(|a| encoder.push(a));
        let sent = copy.send(encoder.take_buffer()).await.map(|_| ());
        if let Err(e) = sent {
            copy.abort(e.to_string()).await.ok();
            return Err(e).context("failed to stream COPY data");
        }
        debug!("COPY streamed {} rows", encoder.rows());
    }

    let sent = copy.send(encoder.finish()).await.map(|_| ());
    if let Err(e) = sent {
        copy.abort(e.to_string()).await.ok();
        return Err(e).context("failed to stream COPY trailer");
    }

    let rows = copy.finish().await.context("COPY was rejected by the server")?;
    Ok(rows)
}
