/// Status Poller
///
/// Waits for a submitted statement to reach FINISHED, FAILED or ABORTED.
/// Polling is bounded: a statement still running after `max_wait` yields
/// `WarehouseError::Timeout`, which callers see separately from a terminal
/// failure reported by the service.
use super::{execute, QueryService, Statement, StatementDescription, StatementHandle, WarehouseError, WarehouseResult};
use std::time::{Duration, Instant};

/// Interval between status checks and the total wait budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }
}

pub async fn wait_for_statement<Q: QueryService>(
    service: &Q,
    handle: &StatementHandle,
    policy: PollPolicy,
) -> WarehouseResult<StatementDescription> {
    let started = Instant::now();

    loop {
        let description = service.describe(handle).await?;
        tracing::info!("Query execution status: {}", description.status);

        if description.status.is_terminal() {
            return Ok(description);
        }

        let waited = started.elapsed();
        if waited >= policy.max_wait {
            tracing::warn!("Statement {} still {} after {:?}, giving up", handle, description.status, waited);
            return Err(WarehouseError::Timeout { handle: handle.clone(), waited });
        }

        tokio::time::sleep(policy.interval).await;
    }
}

/// Submit a statement and block until it reaches a terminal status
pub async fn execute_and_wait<Q: QueryService>(
    service: &Q,
    statement: &Statement,
    policy: PollPolicy,
) -> WarehouseResult<(StatementHandle, StatementDescription)> {
    let handle = execute(service, statement).await?;
    let description = wait_for_statement(service, &handle, policy).await?;

    Ok((handle, description))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Outcome, ScriptedWarehouse};
    use crate::warehouse::StatementStatus;

    fn fast_policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_waits_through_running_states() {
        let warehouse = ScriptedWarehouse::new().on("SELECT 1;", Outcome::FinishedAfter(3, vec![]));

        let (_, description) = execute_and_wait(&warehouse, &Statement::new("SELECT 1;"), fast_policy()).await.unwrap();

        assert_eq!(description.status, StatementStatus::Finished);
        assert_eq!(warehouse.describe_calls(), 4);
    }

    #[tokio::test]
    async fn test_failed_is_terminal_not_error() {
        let warehouse = ScriptedWarehouse::new().on("CALL broken();", Outcome::Failed("relation does not exist".into()));

        let (_, description) =
            execute_and_wait(&warehouse, &Statement::new("CALL broken();"), fast_policy()).await.unwrap();

        assert_eq!(description.status, StatementStatus::Failed);
        assert_eq!(description.error.as_deref(), Some("relation does not exist"));
    }

    #[tokio::test]
    async fn test_stuck_statement_times_out() {
        let warehouse = ScriptedWarehouse::new().on("CALL slow();", Outcome::Running);

        let result = execute_and_wait(&warehouse, &Statement::new("CALL slow();"), fast_policy()).await;

        match result {
            Err(WarehouseError::Timeout { waited, .. }) => assert!(waited >= Duration::from_millis(50)),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_error_propagates() {
        let warehouse = ScriptedWarehouse::new().on("SELECT 1;", Outcome::SubmitError("connection refused".into()));

        let result = execute_and_wait(&warehouse, &Statement::new("SELECT 1;"), fast_policy()).await;

        assert!(matches!(result, Err(WarehouseError::Submit(_))));
        assert_eq!(warehouse.describe_calls(), 0);
    }
}
