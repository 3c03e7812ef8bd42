/// Result Fetcher
///
/// Reads row counts back from finished statements. Failures never propagate:
/// they are logged and reported as `RowCount::Unknown`.
use super::{execute_and_wait, Cell, PollPolicy, QueryService, StatementHandle, StatementStatus};
use crate::models::RowCount;
use crate::sql::{self, TableName};

/// First scalar of a finished statement's result set, as an integer count
pub async fn fetch_count<Q: QueryService>(service: &Q, handle: &StatementHandle) -> RowCount {
    let rows = match service.fetch_rows(handle).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!("Error fetching query results: {}", e);
            return RowCount::Unknown;
        }
    };

    match rows.first().and_then(|row| row.first()) {
        Some(Cell::Long(n)) => RowCount::Known(*n),
        Some(Cell::Text(s)) => match s.trim().parse::<i64>() {
            Ok(n) => RowCount::Known(n),
            Err(_) => {
                tracing::error!("Statement {} returned a non-numeric count: {:?}", handle, s);
                RowCount::Unknown
            }
        },
        Some(other) => {
            tracing::error!("Statement {} returned a non-integer count: {:?}", handle, other);
            RowCount::Unknown
        }
        None => {
            tracing::warn!("Statement {} returned no rows", handle);
            RowCount::Unknown
        }
    }
}

/// Run `SELECT COUNT(*)` on a table and wait for the answer
pub async fn count_table<Q: QueryService>(service: &Q, table: &TableName, policy: PollPolicy) -> RowCount {
    match execute_and_wait(service, &sql::count_rows(table), policy).await {
        Ok((handle, description)) if description.status == StatementStatus::Finished => {
            fetch_count(service, &handle).await
        }
        Ok((_, description)) => {
            tracing::error!(
                "Count query for {} failed with status: {} ({})",
                table,
                description.status,
                description.error.as_deref().unwrap_or("no error details")
            );
            RowCount::Unknown
        }
        Err(e) => {
            tracing::error!("Count query for {} could not be executed: {}", table, e);
            RowCount::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Outcome, ScriptedWarehouse};
    use std::time::Duration;

    fn policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), Duration::from_millis(50))
    }

    fn table(name: &str) -> TableName {
        TableName::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_count_table_reads_first_scalar() {
        let warehouse = ScriptedWarehouse::new().with_count("silver.a", 42);

        assert_eq!(count_table(&warehouse, &table("silver.a"), policy()).await, RowCount::Known(42));
    }

    #[tokio::test]
    async fn test_count_accepts_numeric_text() {
        let warehouse = ScriptedWarehouse::new()
            .on("COUNT(*) FROM silver.a;", Outcome::Finished(vec![vec![Cell::Text("17".into())]]));

        assert_eq!(count_table(&warehouse, &table("silver.a"), policy()).await, RowCount::Known(17));
    }

    #[tokio::test]
    async fn test_count_failures_become_unknown() {
        let warehouse = ScriptedWarehouse::new()
            .on("COUNT(*) FROM silver.empty;", Outcome::Finished(vec![]))
            .on("COUNT(*) FROM silver.broken;", Outcome::Failed("permission denied".into()))
            .on("COUNT(*) FROM silver.lost;", Outcome::FetchError("result expired".into()))
            .on("COUNT(*) FROM silver.down;", Outcome::SubmitError("throttled".into()));

        for name in ["silver.empty", "silver.broken", "silver.lost", "silver.down"] {
            assert_eq!(count_table(&warehouse, &table(name), policy()).await, RowCount::Unknown, "{name}");
        }
    }
}
