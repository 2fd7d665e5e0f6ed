//! End-to-end processing of one assignment upload
//!
//! parse -> load references -> load existing -> validate -> commit or reject.
//! Every storage call runs under the configured timeout and the caller's
//! cancellation token.

use std::collections::HashSet;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use tokio::select;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{InputError, UploadError};
use crate::services::assembler::assemble;
use crate::services::intake::{parse_upload, UploadLimits};
use crate::services::store::{AssignmentStore, ExistingScope};
use crate::services::validator::{parse_effective_date, RowValidator};
use crate::types::{AssignmentKey, AssignmentRecord, ReferenceMaps, UploadAudit, UploadStatus};

/// How the existing-assignment snapshot is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingLookup {
    /// Entire table
    Full,
    /// Only pairs that rows in the upload could conflict with
    Targeted,
}

impl FromStr for ExistingLookup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(ExistingLookup::Full),
            "targeted" => Ok(ExistingLookup::Targeted),
            other => Err(format!("unknown existing lookup mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub limits: UploadLimits,
    pub validation_workers: usize,
    pub storage_timeout: Duration,
    pub existing_lookup: ExistingLookup,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            limits: UploadLimits::default(),
            validation_workers: 1,
            storage_timeout: Duration::from_secs(30),
            existing_lookup: ExistingLookup::Targeted,
        }
    }
}

pub struct UploadPipeline {
    store: Arc<dyn AssignmentStore>,
    options: PipelineOptions,
}

impl UploadPipeline {
    pub fn new(store: Arc<dyn AssignmentStore>, options: PipelineOptions) -> Self {
        Self { store, options }
    }

    /// Process an upload against the current UTC date
    pub async fn process(
        &self,
        file_name: &str,
        content: &[u8],
        cancel: &CancellationToken,
    ) -> Result<u64, UploadError> {
        self.process_on(file_name, content, Utc::now().date_naive(), cancel).await
    }

    /// Process an upload; `today` is the cutoff for future-dated rows.
    ///
    /// Returns the number of inserted rows. Either every row is committed with a
    /// `Saved` audit, or nothing is and a `Rejected` audit is written for
    /// validation failures. Malformed input is rejected without storage access.
    pub async fn process_on(
        &self,
        file_name: &str,
        content: &[u8],
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<u64, UploadError> {
        let started = Instant::now();

        let records = parse_upload(content, &self.options.limits).map_err(|e| {
            match &e {
                InputError::Malformed(detail) => {
                    error!("Failed to parse upload '{}': {}", file_name, detail)
                }
                InputError::TooLarge { size, max } => {
                    warn!("Upload '{}' is {} bytes, limit is {}", file_name, size, max)
                }
                other => warn!("Upload '{}' rejected: {}", file_name, other),
            }
            e
        })?;
        debug!("Parsed {} rows from '{}'", records.len(), file_name);

        let maps = self
            .stage("load reference maps", cancel, self.store.load_reference_maps())
            .await?;

        let keys;
        let scope = match self.options.existing_lookup {
            ExistingLookup::Full => ExistingScope::All,
            ExistingLookup::Targeted => {
                keys = candidate_keys(&records, &maps);
                ExistingScope::Only(&keys)
            }
        };
        let existing = self
            .stage("load existing assignments", cancel, self.store.load_existing_assignments(scope))
            .await?;

        let maps = Arc::new(maps);
        let records = Arc::new(records);
        let errors = {
            let maps = Arc::clone(&maps);
            let records = Arc::clone(&records);
            let workers = self.options.validation_workers;
            tokio::task::spawn_blocking(move || {
                RowValidator::new(&maps, &existing, today)
                    .with_workers(workers)
                    .validate(&records)
            })
            .await
            .map_err(|e| validation_task_failed(file_name, e))?
        };

        if !errors.is_empty() {
            warn!(
                "Upload '{}' rejected: {} of {} rows invalid",
                file_name,
                errors.len(),
                records.len()
            );
            let audit = UploadAudit::now(file_name, UploadStatus::Rejected);
            self.stage("record rejected upload", cancel, self.store.record_upload(&audit))
                .await?;
            return Err(UploadError::Rejected(errors));
        }

        let assignments = assemble(&records, &maps);
        let audit = UploadAudit::now(file_name, UploadStatus::Saved);
        let inserted = self
            .stage("bulk load assignments", cancel, self.store.commit_batch(&assignments, &audit))
            .await?;

        info!(
            "Processed {} records from '{}' in {}ms",
            inserted,
            file_name,
            started.elapsed().as_millis()
        );
        Ok(inserted)
    }

    /// Run one storage call under the timeout, abandoning it on cancellation
    async fn stage<T, F>(&self, name: &str, cancel: &CancellationToken, call: F) -> Result<T, UploadError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Cancelled during {}", name);
                Err(UploadError::Cancelled)
            }
            result = tokio::time::timeout(self.options.storage_timeout, call) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => {
                    error!("Failed to {}: {:#}", name, e);
                    Err(UploadError::Infrastructure(e.context(format!("failed to {}", name))))
                }
                Err(_) => {
                    error!("Timed out during {} after {:?}", name, self.options.storage_timeout);
                    Err(UploadError::Infrastructure(anyhow::anyhow!(
                        "{} timed out after {:?}",
                        name,
                        self.options.storage_timeout
                    )))
                }
            }
        }
    }
}

fn validation_task_failed(file_name: &str, e: JoinError) -> UploadError {
    error!("Validation task failed for '{}': {}", file_name, e);
    UploadError::Infrastructure(anyhow::Error::new(e).context("validation task failed"))
}

/// (worker_id, date) pairs from rows that could conflict with storage
fn candidate_keys(records: &[AssignmentRecord], maps: &ReferenceMaps) -> Vec<AssignmentKey> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| {
            let worker_id = *maps.workers.get(&record.worker_code)?;
            let date = parse_effective_date(&record.assignment_date)?;
            Some((worker_id, date))
        })
        .filter(|key| seen.insert(*key))
        .collect()
}
