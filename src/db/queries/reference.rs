//! Reference table lookups (workers, zones)

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::types::ReferenceMap;

/// Load every worker as code -> id
pub async fn load_worker_codes(pool: &PgPool) -> Result<ReferenceMap> {
    let rows: Vec<(String, i32)> = sqlx::query_as("SELECT code, id FROM worker")
        .fetch_all(pool)
        .await
        .context("failed to load worker codes")?;

    Ok(rows.into_iter().collect())
}

/// Load every zone as code -> id
pub async fn load_zone_codes(pool: &PgPool) -> Result<ReferenceMap> {
    let rows: Vec<(String, i32)> = sqlx::query_as("SELECT code, id FROM zone")
        .fetch_all(pool)
        .await
        .context("failed to load zone codes")?;

    Ok(rows.into_iter().collect())
}
