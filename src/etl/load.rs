/// Load Module
///
/// Bulk loads an arriving Parquet file into the staging table.
///
/// Admission is "latest file wins": the file must be Parquet, live under the
/// watched prefix, and be the most recently modified object there. Anything
/// else is skipped before a single statement reaches the warehouse. Duplicate
/// notifications for the same object are not detected and load it again.
use crate::config::{LoadConfig, PollSettings};
use crate::models::{Layer, LoadRequest, ReconciliationStatus, RowCount};
use crate::sql::{self, TableName};
use crate::storage::{latest_object, ObjectStore};
use crate::tracker::{EtlTracker, TrackedStep};
use crate::warehouse::{count_table, execute, wait_for_statement, QueryService, StatementStatus};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

pub const WATCHED_PREFIX: &str = "silver-layer/";
pub const PARQUET_EXTENSION: &str = ".parquet";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LoadOutcome {
    Skipped,
    Success { statement_id: String },
    Error { message: String },
}

/// Why a file was not admitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotParquet,
    OutsidePrefix,
    NoObjects,
    NotLatest { latest: String },
}

pub struct LoadDriver<'a, Q, S> {
    warehouse: &'a Q,
    store: &'a S,
    config: &'a LoadConfig,
    polling: PollSettings,
}

impl<'a, Q: QueryService, S: ObjectStore> LoadDriver<'a, Q, S> {
    pub fn new(warehouse: &'a Q, store: &'a S, config: &'a LoadConfig, polling: PollSettings) -> Self {
        Self { warehouse, store, config, polling }
    }

    pub async fn run(&self, request: &LoadRequest) -> LoadOutcome {
        tracing::info!("Processing file from bucket: {}, key: {}", request.s3_bucket, request.s3_key);

        match self.admit(request).await {
            Ok(None) => {}
            Ok(Some(reason)) => {
                log_skip(&request.s3_key, &reason);
                return LoadOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!("Error in load driver: {:#}", e);
                return LoadOutcome::Error { message: format!("{:#}", e) };
            }
        }

        let tracker = EtlTracker::new(self.warehouse, self.polling.policy());
        let mut started: Option<TrackedStep> = None;

        match self.load(request, &tracker, &mut started).await {
            Ok(statement_id) => LoadOutcome::Success { statement_id },
            Err(e) => {
                tracing::error!("Error in load driver: {:#}", e);
                if let Some(step) = started {
                    tracker.record_failure(&step, Utc::now()).await;
                }
                LoadOutcome::Error { message: format!("{:#}", e) }
            }
        }
    }

    /// `None` when the file should be loaded
    async fn admit(&self, request: &LoadRequest) -> Result<Option<SkipReason>> {
        if !request.s3_key.ends_with(PARQUET_EXTENSION) {
            return Ok(Some(SkipReason::NotParquet));
        }

        if !request.s3_key.starts_with(WATCHED_PREFIX) {
            return Ok(Some(SkipReason::OutsidePrefix));
        }

        let objects = self.store.list_objects(&request.s3_bucket, WATCHED_PREFIX).await?;

        let Some(latest) = latest_object(&objects) else {
            return Ok(Some(SkipReason::NoObjects));
        };

        if latest.key != request.s3_key {
            return Ok(Some(SkipReason::NotLatest { latest: latest.key.clone() }));
        }

        Ok(None)
    }

    async fn load(
        &self,
        request: &LoadRequest,
        tracker: &EtlTracker<'a, Q>,
        started: &mut Option<TrackedStep>,
    ) -> Result<String> {
        let table = TableName::parse(&self.config.target_table)?;
        let copy = sql::copy_parquet(&table, &request.s3_bucket, &request.s3_key, &self.config.iam_role)?;

        // Nothing counts the Parquet object itself, so the source side stays unknown
        let source_count = RowCount::Unknown;
        let step =
            tracker.record_start(Layer::Staging, Layer::Silver, table.as_str(), table.as_str(), source_count).await;
        let step = started.insert(step);

        let handle = execute(self.warehouse, &copy).await.context("Error executing COPY")?;
        tracing::info!("Redshift COPY initiated, statement id: {}", handle);

        let description = wait_for_statement(self.warehouse, &handle, self.polling.load_policy())
            .await
            .context("Error waiting for COPY")?;

        if description.status != StatementStatus::Finished {
            anyhow::bail!(
                "COPY operation failed with status {}: {}",
                description.status,
                description.error.as_deref().unwrap_or("no error details")
            );
        }

        let destination_count = count_table(self.warehouse, &table, self.polling.policy()).await;
        let reconciliation = ReconciliationStatus::from_counts(source_count, destination_count);

        tracker.record_success(step, destination_count, reconciliation, Utc::now()).await;
        *started = None;

        Ok(handle.to_string())
    }
}

fn log_skip(key: &str, reason: &SkipReason) {
    match reason {
        SkipReason::NotParquet => tracing::info!("Skipping non-parquet file: {}", key),
        SkipReason::OutsidePrefix => {
            tracing::info!("Skipping file {} because it is not under the {} prefix.", key, WATCHED_PREFIX)
        }
        SkipReason::NoObjects => tracing::info!("No objects found under the {} prefix.", WATCHED_PREFIX),
        SkipReason::NotLatest { latest } => {
            tracing::info!("Skipping file {} because it is not the latest. Latest file is: {}", key, latest)
        }
    }
}
