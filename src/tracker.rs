/// ETL Tracker Module
///
/// Bookkeeping rows in `gold.etl_tracker`, one per executed step:
/// - `record_start` inserts a STARTED row under a freshly generated run id
/// - `record_success` / `record_failure` move that row, and only that row, to
///   its terminal status
///
/// Tracker writes never fail the step they describe. Any error is logged and
/// swallowed, which means a row can stay STARTED if its closing update fails.
use crate::models::{Layer, ReconciliationStatus, RowCount, TrackerStatus};
use crate::warehouse::{execute_and_wait, PollPolicy, QueryService, Statement, StatementStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const TRACKER_TABLE: &str = "gold.etl_tracker";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A tracker row opened by `record_start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedStep {
    pub run_id: Uuid,
    pub source_table: String,
    pub destination_table: String,
}

pub struct EtlTracker<'a, Q> {
    service: &'a Q,
    policy: PollPolicy,
}

impl<'a, Q: QueryService> EtlTracker<'a, Q> {
    pub fn new(service: &'a Q, policy: PollPolicy) -> Self {
        Self { service, policy }
    }

    pub async fn record_start(
        &self,
        source_layer: Layer,
        destination_layer: Layer,
        source_table: &str,
        destination_table: &str,
        source_count: RowCount,
    ) -> TrackedStep {
        let step = TrackedStep {
            run_id: Uuid::new_v4(),
            source_table: source_table.to_string(),
            destination_table: destination_table.to_string(),
        };

        let statement = insert_started(&step, source_layer, destination_layer, source_count, Utc::now());
        self.write(&step, TrackerStatus::Started, &statement).await;

        step
    }

    pub async fn record_success(
        &self,
        step: &TrackedStep,
        destination_count: RowCount,
        reconciliation: ReconciliationStatus,
        completed_at: DateTime<Utc>,
    ) {
        let statement = update_success(step, destination_count, reconciliation, completed_at);
        self.write(step, TrackerStatus::Success, &statement).await;
    }

    pub async fn record_failure(&self, step: &TrackedStep, failed_at: DateTime<Utc>) {
        let statement = update_failure(step, failed_at);
        self.write(step, TrackerStatus::Failed, &statement).await;
    }

    async fn write(&self, step: &TrackedStep, status: TrackerStatus, statement: &Statement) {
        match execute_and_wait(self.service, statement, self.policy).await {
            Ok((_, description)) if description.status == StatementStatus::Finished => {
                tracing::debug!("Tracker row {} for {} marked {}", step.run_id, step.destination_table, status.as_str());
            }
            Ok((handle, description)) => tracing::error!(
                "Error writing {} tracker row for {} (statement {} {}): {}",
                status.as_str(),
                step.destination_table,
                handle,
                description.status,
                description.error.as_deref().unwrap_or("no error details")
            ),
            Err(e) => {
                tracing::error!("Error writing {} tracker row for {}: {}", status.as_str(), step.destination_table, e)
            }
        }
    }
}

fn count_expression(count: RowCount, placeholder: &str) -> String {
    match count {
        RowCount::Known(_) => format!("CAST(:{} AS BIGINT)", placeholder),
        RowCount::Unknown => "NULL".to_string(),
    }
}

fn bind_count(statement: Statement, name: &str, count: RowCount) -> Statement {
    match count.value() {
        Some(n) => statement.bind(name, n),
        None => statement,
    }
}

pub fn insert_started(
    step: &TrackedStep,
    source_layer: Layer,
    destination_layer: Layer,
    source_count: RowCount,
    started_at: DateTime<Utc>,
) -> Statement {
    let sql = format!(
        "INSERT INTO {} (run_id, source_layer, destination_layer, source_table, destination_table, status, \
         completion_timestamp, source_count) \
         VALUES (:run_id, :source_layer, :destination_layer, :source_table, :destination_table, '{}', \
         CAST(:completion_timestamp AS TIMESTAMP), {});",
        TRACKER_TABLE,
        TrackerStatus::Started.as_str(),
        count_expression(source_count, "source_count")
    );

    let statement = Statement::new(sql)
        .bind("run_id", step.run_id)
        .bind("source_layer", source_layer.as_str())
        .bind("destination_layer", destination_layer.as_str())
        .bind("source_table", &step.source_table)
        .bind("destination_table", &step.destination_table)
        .bind("completion_timestamp", started_at.format(TIMESTAMP_FORMAT));

    bind_count(statement, "source_count", source_count)
}

pub fn update_success(
    step: &TrackedStep,
    destination_count: RowCount,
    reconciliation: ReconciliationStatus,
    completed_at: DateTime<Utc>,
) -> Statement {
    let sql = format!(
        "UPDATE {} SET status = '{}', completion_timestamp = CAST(:completion_timestamp AS TIMESTAMP), \
         destination_count = {}, reconciliation_status = :reconciliation_status \
         WHERE run_id = :run_id AND status = '{}';",
        TRACKER_TABLE,
        TrackerStatus::Success.as_str(),
        count_expression(destination_count, "destination_count"),
        TrackerStatus::Started.as_str()
    );

    let statement = Statement::new(sql)
        .bind("completion_timestamp", completed_at.format(TIMESTAMP_FORMAT))
        .bind("reconciliation_status", reconciliation.as_str())
        .bind("run_id", step.run_id);

    bind_count(statement, "destination_count", destination_count)
}

pub fn update_failure(step: &TrackedStep, failed_at: DateTime<Utc>) -> Statement {
    let sql = format!(
        "UPDATE {} SET status = '{}', completion_timestamp = CAST(:completion_timestamp AS TIMESTAMP) \
         WHERE run_id = :run_id AND status = '{}';",
        TRACKER_TABLE,
        TrackerStatus::Failed.as_str(),
        TrackerStatus::Started.as_str()
    );

    Statement::new(sql).bind("completion_timestamp", failed_at.format(TIMESTAMP_FORMAT)).bind("run_id", step.run_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, Outcome, ScriptedWarehouse};
    use std::time::Duration;

    fn policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), Duration::from_millis(50))
    }

    fn step() -> TrackedStep {
        TrackedStep {
            run_id: Uuid::nil(),
            source_table: "silver.tbl_healthcare_analytics_data".into(),
            destination_table: "gold.dim_dates".into(),
        }
    }

    #[test]
    fn test_insert_started_binds_values() {
        let statement = insert_started(&step(), Layer::Silver, Layer::Gold, RowCount::Known(15), at(0));

        assert!(statement.sql().starts_with("INSERT INTO gold.etl_tracker"));
        assert!(statement.sql().contains("'STARTED'"));
        assert!(statement.sql().contains("CAST(:source_count AS BIGINT)"));
        assert_eq!(statement.param("source_layer"), Some("silver"));
        assert_eq!(statement.param("destination_layer"), Some("gold"));
        assert_eq!(statement.param("destination_table"), Some("gold.dim_dates"));
        assert_eq!(statement.param("source_count"), Some("15"));
        assert_eq!(statement.param("completion_timestamp"), Some("2023-11-14 22:13:20"));
        assert_eq!(statement.param("run_id"), Some("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_unknown_count_is_null() {
        let statement = insert_started(&step(), Layer::Staging, Layer::Silver, RowCount::Unknown, at(0));

        assert!(statement.sql().ends_with("CAST(:completion_timestamp AS TIMESTAMP), NULL);"));
        assert_eq!(statement.param("source_count"), None);
    }

    #[test]
    fn test_updates_key_on_run_id() {
        let success = update_success(&step(), RowCount::Known(14), ReconciliationStatus::Mismatch, at(5));
        let failure = update_failure(&step(), at(5));

        for statement in [&success, &failure] {
            assert!(statement.sql().contains("WHERE run_id = :run_id AND status = 'STARTED';"));
            assert!(!statement.sql().contains("destination_table ="));
            assert_eq!(statement.param("run_id"), Some("00000000-0000-0000-0000-000000000000"));
        }
        assert!(success.sql().contains("SET status = 'SUCCESS'"));
        assert_eq!(success.param("reconciliation_status"), Some("MISMATCH"));
        assert_eq!(success.param("destination_count"), Some("14"));
        assert!(failure.sql().contains("SET status = 'FAILED'"));
    }

    #[tokio::test]
    async fn test_each_start_gets_its_own_run_id() {
        let warehouse = ScriptedWarehouse::new();
        let tracker = EtlTracker::new(&warehouse, policy());

        let first = tracker.record_start(Layer::Silver, Layer::Gold, "silver.a", "gold.b", RowCount::Known(1)).await;
        let second = tracker.record_start(Layer::Silver, Layer::Gold, "silver.a", "gold.b", RowCount::Known(1)).await;
        tracker.record_failure(&first, at(1)).await;

        assert_ne!(first.run_id, second.run_id);
        let statements = warehouse.statements();
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[2].param("run_id"), Some(first.run_id.to_string().as_str()));
    }

    #[tokio::test]
    async fn test_write_failures_are_swallowed() {
        let warehouse = ScriptedWarehouse::new()
            .on("INSERT INTO gold.etl_tracker", Outcome::SubmitError("throttled".into()))
            .on("UPDATE gold.etl_tracker", Outcome::Failed("serializable isolation violation".into()));
        let tracker = EtlTracker::new(&warehouse, policy());

        let step = tracker.record_start(Layer::Silver, Layer::Gold, "silver.a", "gold.b", RowCount::Unknown).await;
        tracker.record_success(&step, RowCount::Known(3), ReconciliationStatus::Mismatch, at(2)).await;
        tracker.record_failure(&step, at(3)).await;

        assert_eq!(warehouse.statements().len(), 3);
    }
}
