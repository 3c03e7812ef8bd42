/// Postgres backend
///
/// Runs statements over the Postgres wire protocol (Redshift clusters accept
/// it as well) through a sqlx connection pool. Each submitted statement runs
/// on its own tokio task and is tracked under a generated handle, so callers
/// use the same submit / poll / fetch protocol as with the Data API.
use super::{Cell, QueryService, Statement, StatementDescription, StatementHandle, StatementStatus};
use super::{WarehouseError, WarehouseResult};
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;
use uuid::Uuid;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(^|[^:]):([A-Za-z_][A-Za-z0-9_]*)").unwrap());

#[derive(Debug, Clone)]
enum Execution {
    Running,
    Finished(Vec<Vec<Cell>>),
    Failed(String),
}

#[derive(Clone)]
pub struct PostgresQueryService {
    pool: PgPool,
    executions: Arc<Mutex<HashMap<String, Execution>>>,
}

impl PostgresQueryService {
    /// Create a new database connection pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        Ok(Self::with_pool(pool))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool, executions: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Create the tracker schema and table
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.context("Failed to run database migrations")?;

        tracing::info!("Database migrations completed successfully");
        Ok(())
    }

    /// Test the database connection
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.context("Database connection test failed")?;

        Ok(())
    }
}

impl QueryService for PostgresQueryService {
    async fn submit(&self, statement: &Statement) -> WarehouseResult<StatementHandle> {
        let id = Uuid::new_v4().to_string();
        self.executions.lock().await.insert(id.clone(), Execution::Running);

        let pool = self.pool.clone();
        let executions = Arc::clone(&self.executions);
        let statement = statement.clone();
        let task_id = id.clone();

        tokio::spawn(async move {
            let execution = match run_statement(&pool, &statement).await {
                Ok(rows) => Execution::Finished(rows),
                Err(e) => Execution::Failed(e.to_string()),
            };
            executions.lock().await.insert(task_id, execution);
        });

        Ok(StatementHandle::new(id))
    }

    async fn describe(&self, handle: &StatementHandle) -> WarehouseResult<StatementDescription> {
        let executions = self.executions.lock().await;

        match executions.get(handle.as_str()) {
            Some(Execution::Running) => Ok(StatementDescription { status: StatementStatus::Started, error: None }),
            Some(Execution::Finished(_)) => Ok(StatementDescription { status: StatementStatus::Finished, error: None }),
            Some(Execution::Failed(message)) => {
                Ok(StatementDescription { status: StatementStatus::Failed, error: Some(message.clone()) })
            }
            None => Err(WarehouseError::UnknownHandle(handle.clone())),
        }
    }

    async fn fetch_rows(&self, handle: &StatementHandle) -> WarehouseResult<Vec<Vec<Cell>>> {
        let executions = self.executions.lock().await;

        match executions.get(handle.as_str()) {
            Some(Execution::Finished(rows)) => Ok(rows.clone()),
            Some(Execution::Running) => {
                Err(WarehouseError::Fetch { handle: handle.clone(), message: "statement is still running".into() })
            }
            Some(Execution::Failed(message)) => {
                Err(WarehouseError::Fetch { handle: handle.clone(), message: message.clone() })
            }
            None => Err(WarehouseError::UnknownHandle(handle.clone())),
        }
    }
}

async fn run_statement(pool: &PgPool, statement: &Statement) -> WarehouseResult<Vec<Vec<Cell>>> {
    // Unparameterised text may hold several `;`-separated statements
    let rows = if statement.params().is_empty() {
        sqlx::raw_sql(statement.sql()).fetch_all(pool).await?
    } else {
        let (sql, values) = to_positional(statement);
        let mut query = sqlx::query(&sql);
        for value in values {
            query = query.bind(value);
        }
        query.fetch_all(pool).await?
    };

    Ok(rows.iter().map(decode_row).collect())
}

/// Rewrite `:name` placeholders to `$n`, returning the values in bind order
fn to_positional(statement: &Statement) -> (String, Vec<String>) {
    let mut values: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    let sql = PLACEHOLDER.replace_all(statement.sql(), |caps: &Captures| {
        let name = &caps[2];
        match statement.param(name) {
            Some(value) => {
                let position = *positions.entry(name.to_string()).or_insert_with(|| {
                    values.push(value.to_string());
                    values.len()
                });
                format!("{}${}", &caps[1], position)
            }
            None => caps[0].to_string(),
        }
    });

    (sql.into_owned(), values)
}

fn decode_row(row: &PgRow) -> Vec<Cell> {
    (0..row.len()).map(|index| decode_cell(row, index)).collect()
}

fn decode_cell(row: &PgRow, index: usize) -> Cell {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map(Cell::Long).unwrap_or(Cell::Null);
    }
    if let Ok(value) = row.try_get::<Option<i32>, _>(index) {
        return value.map(|n| Cell::Long(n.into())).unwrap_or(Cell::Null);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map(Cell::Double).unwrap_or(Cell::Null);
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return value.map(Cell::Bool).unwrap_or(Cell::Null);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map(Cell::Text).unwrap_or(Cell::Null);
    }

    Cell::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_positional_numbers_placeholders_in_order() {
        let statement = Statement::new("UPDATE t SET a = :a, b = CAST(:b AS BIGINT) WHERE id = :id AND a <> :a")
            .bind("id", "run-1")
            .bind("a", "x")
            .bind("b", 7);

        let (sql, values) = to_positional(&statement);

        assert_eq!(sql, "UPDATE t SET a = $1, b = CAST($2 AS BIGINT) WHERE id = $3 AND a <> $1");
        assert_eq!(values, vec!["x", "7", "run-1"]);
    }

    #[test]
    fn test_to_positional_leaves_casts_and_unknown_names() {
        let statement = Statement::new("SELECT :v::text, :other").bind("v", "1");

        let (sql, values) = to_positional(&statement);

        assert_eq!(sql, "SELECT $1::text, :other");
        assert_eq!(values, vec!["1"]);
    }
}
