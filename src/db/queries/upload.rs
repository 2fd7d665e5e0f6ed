//! Upload audit queries

use anyhow::{Context, Result};
use sqlx::{Executor, Postgres};

use crate::types::UploadAudit;

/// Insert one audit row; pass a transaction to make it part of a larger unit
pub async fn insert_upload_status<'e, E>(executor: E, audit: &UploadAudit) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO uploaded_files (file_name, status, uploaded_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(&audit.file_name)
    .bind(audit.status.as_str())
    .bind(audit.uploaded_at)
    .execute(executor)
    .await
    .context("failed to record upload status")?;

    Ok(())
}
