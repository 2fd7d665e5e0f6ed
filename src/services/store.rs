//! Storage seam for the upload pipeline

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::db::queries::{assignment, reference, upload};
use crate::types::{Assignment, AssignmentKey, ExistingAssignments, ReferenceMaps, UploadAudit};

/// Which committed assignments to fetch for the conflict check
#[derive(Debug, Clone, Copy)]
pub enum ExistingScope<'a> {
    All,
    Only(&'a [AssignmentKey]),
}

/// Everything the pipeline needs from the database
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Worker and zone code lookup tables
    async fn load_reference_maps(&self) -> Result<ReferenceMaps>;

    async fn load_existing_assignments(&self, scope: ExistingScope<'_>) -> Result<ExistingAssignments>;

    /// Persist an audit row in its own transaction
    async fn record_upload(&self, audit: &UploadAudit) -> Result<()>;

    /// Insert all assignments and the audit row atomically.
    ///
    /// On error (or if the future is dropped) nothing is persisted.
    async fn commit_batch(&self, assignments: &[Assignment], audit: &UploadAudit) -> Result<u64>;

    fn name(&self) -> &'static str;
}

pub struct PgAssignmentStore {
    pool: PgPool,
}

impl PgAssignmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssignmentStore for PgAssignmentStore {
    async fn load_reference_maps(&self) -> Result<ReferenceMaps> {
        let (workers, zones) = tokio::try_join!(
            reference::load_worker_codes(&self.pool),
            reference::load_zone_codes(&self.pool),
        )?;
        debug!("Loaded {} worker codes, {} zone codes", workers.len(), zones.len());
        Ok(ReferenceMaps { workers, zones })
    }

    async fn load_existing_assignments(&self, scope: ExistingScope<'_>) -> Result<ExistingAssignments> {
        match scope {
            ExistingScope::All => assignment::load_all_existing(&self.pool).await,
            ExistingScope::Only(keys) => assignment::load_existing_for_keys(&self.pool, keys).await,
        }
    }

    async fn record_upload(&self, audit: &UploadAudit) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        upload::insert_upload_status(&mut *tx, audit).await?;
        tx.commit().await.context("failed to commit upload status")?;
        Ok(())
    }

    async fn commit_batch(&self, assignments: &[Assignment], audit: &UploadAudit) -> Result<u64> {
        // Dropping `tx` without commit rolls back
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let rows = assignment::copy_assignments(&mut *tx, assignments).await?;
        upload::insert_upload_status(&mut *tx, audit).await?;
        tx.commit().await.context("failed to commit assignments")?;
        Ok(rows)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
pub mod mock {
    use std::time::Duration;

    use anyhow::bail;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MockState {
        pub maps: ReferenceMaps,
        pub existing: ExistingAssignments,
        pub committed: Vec<Assignment>,
        pub audits: Vec<UploadAudit>,
        /// `Some(None)` after a full lookup, `Some(Some(keys))` after a targeted one
        pub last_scope: Option<Option<Vec<AssignmentKey>>>,
        pub fail_reference_load: bool,
        pub fail_commit: bool,
        pub commit_delay: Option<Duration>,
        pub reference_delay: Option<Duration>,
    }

    /// In-memory store with the same all-or-nothing commit behavior
    #[derive(Default)]
    pub struct MockAssignmentStore {
        pub state: Mutex<MockState>,
    }

    impl MockAssignmentStore {
        pub fn with_references(workers: &[(&str, i32)], zones: &[(&str, i32)]) -> Self {
            let store = Self::default();
            {
                let mut state = store.state.lock();
                state.maps.workers = workers.iter().map(|(c, id)| (c.to_string(), *id)).collect();
                state.maps.zones = zones.iter().map(|(c, id)| (c.to_string(), *id)).collect();
            }
            store
        }
    }

    #[async_trait]
    impl AssignmentStore for MockAssignmentStore {
        async fn load_reference_maps(&self) -> Result<ReferenceMaps> {
            let delay = self.state.lock().reference_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let state = self.state.lock();
            if state.fail_reference_load {
                bail!("reference tables unavailable");
            }
            Ok(state.maps.clone())
        }

        async fn load_existing_assignments(&self, scope: ExistingScope<'_>) -> Result<ExistingAssignments> {
            let mut state = self.state.lock();
            match scope {
                ExistingScope::All => {
                    state.last_scope = Some(None);
                    Ok(state.existing.clone())
                }
                ExistingScope::Only(keys) => {
                    state.last_scope = Some(Some(keys.to_vec()));
                    Ok(keys.iter().filter(|k| state.existing.contains(*k)).copied().collect())
                }
            }
        }

        async fn record_upload(&self, audit: &UploadAudit) -> Result<()> {
            self.state.lock().audits.push(audit.clone());
            Ok(())
        }

        async fn commit_batch(&self, assignments: &[Assignment], audit: &UploadAudit) -> Result<u64> {
            let delay = self.state.lock().commit_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let mut state = self.state.lock();
            if state.fail_commit {
                bail!("bulk load failed");
            }
            state.committed.extend_from_slice(assignments);
            state
                .existing
                .extend(assignments.iter().map(|a| (a.worker_id, a.effective_date)));
            state.audits.push(audit.clone());
            Ok(assignments.len() as u64)
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;
    use crate::db;
    use crate::types::UploadStatus;

    // Note: These tests need a PostgreSQL instance reachable at DATABASE_URL
    // They are marked as ignored by default

    async fn connect() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = db::create_pool(&url, 2, std::time::Duration::from_secs(10))
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();
        pool
    }

    /// Insert a worker and a zone with unique codes, returning their ids
    async fn seed_references(pool: &PgPool) -> (i32, i32) {
        let suffix = &Uuid::new_v4().simple().to_string()[..8];
        let worker_id: i32 = sqlx::query_scalar("INSERT INTO worker (name, code) VALUES ($1, $2) RETURNING id")
            .bind("Test worker")
            .bind(format!("W{}", suffix))
            .fetch_one(pool)
            .await
            .unwrap();
        let zone_id: i32 = sqlx::query_scalar("INSERT INTO zone (name, code) VALUES ($1, $2) RETURNING id")
            .bind("Test zone")
            .bind(format!("Z{}", suffix))
            .fetch_one(pool)
            .await
            .unwrap();
        (worker_id, zone_id)
    }

    async fn count_assignments(pool: &PgPool, zone_id: i32) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM worker_zone_assignment WHERE zone_id = $1")
            .bind(zone_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn audit_statuses(pool: &PgPool, file_name: &str) -> Vec<String> {
        sqlx::query_scalar("SELECT status FROM uploaded_files WHERE file_name = $1")
            .bind(file_name)
            .fetch_all(pool)
            .await
            .unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2999, 1, day).unwrap()
    }

    #[tokio::test]
    #[ignore]
    async fn test_commit_batch_copies_rows_and_saved_audit() {
        let pool = connect().await;
        let (worker_id, zone_id) = seed_references(&pool).await;
        let store = PgAssignmentStore::new(pool.clone());

        let assignments: Vec<Assignment> = (1..=3)
            .map(|day| Assignment { worker_id, zone_id, effective_date: date(day) })
            .collect();
        let file_name = format!("{}.csv", Uuid::new_v4());
        let audit = UploadAudit::now(&file_name, UploadStatus::Saved);

        let copied = store.commit_batch(&assignments, &audit).await.unwrap();

        assert_eq!(copied, 3);
        assert_eq!(count_assignments(&pool, zone_id).await, 3);
        assert_eq!(audit_statuses(&pool, &file_name).await, vec!["Saved".to_string()]);

        let keys = [(worker_id, date(2)), (worker_id, date(9))];
        let existing = store
            .load_existing_assignments(ExistingScope::Only(&keys))
            .await
            .unwrap();
        assert_eq!(existing.len(), 1);
        assert!(existing.contains(&(worker_id, date(2))));
    }

    #[tokio::test]
    #[ignore]
    async fn test_failed_copy_persists_neither_rows_nor_audit() {
        let pool = connect().await;
        let (worker_id, zone_id) = seed_references(&pool).await;
        let store = PgAssignmentStore::new(pool.clone());

        // Second row references a worker that does not exist
        let assignments = vec![
            Assignment { worker_id, zone_id, effective_date: date(1) },
            Assignment { worker_id: -1, zone_id, effective_date: date(2) },
        ];
        let file_name = format!("{}.csv", Uuid::new_v4());
        let audit = UploadAudit::now(&file_name, UploadStatus::Saved);

        let result = store.commit_batch(&assignments, &audit).await;

        assert!(result.is_err());
        assert_eq!(count_assignments(&pool, zone_id).await, 0);
        assert!(audit_statuses(&pool, &file_name).await.is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_reference_maps_include_seeded_codes() {
        let pool = connect().await;
        let (worker_id, zone_id) = seed_references(&pool).await;
        let store = PgAssignmentStore::new(pool);

        let maps = store.load_reference_maps().await.unwrap();

        assert!(maps.workers.values().any(|id| *id == worker_id));
        assert!(maps.zones.values().any(|id| *id == zone_id));
    }
}
