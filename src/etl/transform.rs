/// Transform Module
///
/// Drives the silver → gold transformation steps in order. Each step counts
/// its sources, opens a tracker row, runs its merge statement, counts the
/// destination and closes the row with a reconciliation status.
///
/// The first failing step aborts the run. Steps already completed stay
/// completed; there is no rollback across steps.
use crate::models::{Layer, ReconciliationStatus, RowCount, TransformationStep};
use crate::pipeline::RunStats;
use crate::sql::{self, TableName};
use crate::tracker::{EtlTracker, TrackedStep};
use crate::warehouse::{count_table, execute, execute_and_wait, wait_for_statement, PollPolicy, QueryService};
use crate::warehouse::{Statement, StatementStatus, WarehouseError};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status")]
pub enum TransformOutcome {
    #[serde(rename = "Transformations Completed")]
    Completed { details: String },
    #[serde(rename = "Error")]
    Error { message: String },
}

pub struct TransformDriver<'a, Q> {
    warehouse: &'a Q,
    policy: PollPolicy,
}

impl<'a, Q: QueryService> TransformDriver<'a, Q> {
    pub fn new(warehouse: &'a Q, policy: PollPolicy) -> Self {
        Self { warehouse, policy }
    }

    pub async fn run(&self, steps: &[TransformationStep]) -> (TransformOutcome, RunStats) {
        let started_at = Instant::now();
        let tracker = EtlTracker::new(self.warehouse, self.policy);
        let mut stats = RunStats::new(steps.len());
        let mut in_flight: Option<TrackedStep> = None;

        let result = self.run_steps(steps, &tracker, &mut in_flight, &mut stats).await;
        stats.elapsed_time = started_at.elapsed();

        let outcome = match result {
            Ok(()) => TransformOutcome::Completed {
                details: "All steps executed successfully with reconciliation.".to_string(),
            },
            Err(e) => {
                tracing::error!("Error occurred in transformation: {:#}", e);
                if stats.steps_attempted > stats.steps_succeeded {
                    stats.steps_failed += 1;
                }
                if let Some(step) = in_flight.take() {
                    tracker.record_failure(&step, Utc::now()).await;
                }
                TransformOutcome::Error { message: format!("{:#}", e) }
            }
        };

        stats.log_summary();
        (outcome, stats)
    }

    async fn probe(&self) -> Result<()> {
        tracing::info!("Testing Redshift connection by executing: SELECT 1;");

        let (_, description) = execute_and_wait(self.warehouse, &sql::probe(), self.policy)
            .await
            .context("Test query execution failed! Cannot connect to the warehouse.")?;

        if description.status != StatementStatus::Finished {
            anyhow::bail!("Test query failed with status: {}", description.status);
        }

        tracing::info!("Test query executed successfully! Proceeding with transformations.");
        Ok(())
    }

    async fn run_steps(
        &self,
        steps: &[TransformationStep],
        tracker: &EtlTracker<'a, Q>,
        in_flight: &mut Option<TrackedStep>,
        stats: &mut RunStats,
    ) -> Result<()> {
        self.probe().await?;

        for step in steps {
            tracing::info!("Executing step: {} <- {}", step.destination_table, step.source_table);
            stats.steps_attempted += 1;

            let sources =
                step.source_tables().into_iter().map(TableName::parse).collect::<Result<Vec<_>, _>>()?;
            let destination = TableName::parse(&step.destination_table)?;

            let mut counts = Vec::with_capacity(sources.len());
            for source in &sources {
                counts.push(count_table(self.warehouse, source, self.policy).await);
            }
            let source_count = RowCount::sum(counts);

            let tracked = tracker
                .record_start(Layer::Silver, Layer::Gold, &step.source_table, destination.as_str(), source_count)
                .await;
            let tracked = in_flight.insert(tracked);

            self.merge(step, &destination).await?;

            let destination_count = count_table(self.warehouse, &destination, self.policy).await;
            let reconciliation = ReconciliationStatus::from_counts(source_count, destination_count);
            tracing::info!(
                "{}: source {:?}, destination {:?} -> {}",
                destination,
                source_count,
                destination_count,
                reconciliation.as_str()
            );

            tracker.record_success(tracked, destination_count, reconciliation, Utc::now()).await;
            *in_flight = None;
            stats.record_success(reconciliation);
        }

        Ok(())
    }

    async fn merge(&self, step: &TransformationStep, destination: &TableName) -> Result<()> {
        let statement = Statement::new(step.merge_query.clone());

        let handle = execute(self.warehouse, &statement)
            .await
            .with_context(|| format!("MERGE query execution failed for {}!", destination))?;

        let description = match wait_for_statement(self.warehouse, &handle, self.policy).await {
            Ok(description) => description,
            Err(e @ WarehouseError::Timeout { .. }) => {
                return Err(e).with_context(|| format!("MERGE query for {} timed out", destination))
            }
            Err(e) => return Err(e).with_context(|| format!("MERGE query for {} could not be polled", destination)),
        };

        if description.status != StatementStatus::Finished {
            anyhow::bail!(
                "MERGE query for {} failed with status {}! {}",
                destination,
                description.status,
                description.error.as_deref().unwrap_or("")
            );
        }

        Ok(())
    }
}
