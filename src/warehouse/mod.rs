/// Warehouse Module
///
/// The query-service seam. Statements are submitted asynchronously and
/// identified by an opaque handle; callers poll the handle until it reaches a
/// terminal status and then fetch its rows. Two backends implement the
/// protocol:
/// - `redshift`: the Redshift Data API
/// - `postgres`: a direct Postgres wire connection through sqlx
pub mod fetch;
pub mod poller;
pub mod postgres;
pub mod redshift;

pub use fetch::count_table;
pub use poller::{execute_and_wait, wait_for_statement, PollPolicy};

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// SQL text plus named parameters referenced as `:name` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    params: Vec<(String, String)>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), params: Vec::new() }
    }

    /// Bind a value to the `:name` placeholder
    pub fn bind(mut self, name: &str, value: impl ToString) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }
}

/// Opaque identifier of a submitted statement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementHandle(String);

impl StatementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementStatus {
    Submitted,
    Picked,
    Started,
    Finished,
    Failed,
    Aborted,
}

impl StatementStatus {
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "SUBMITTED" => Some(Self::Submitted),
            "PICKED" => Some(Self::Picked),
            "STARTED" => Some(Self::Started),
            "FINISHED" => Some(Self::Finished),
            "FAILED" => Some(Self::Failed),
            "ABORTED" => Some(Self::Aborted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Picked => "PICKED",
            Self::Started => "STARTED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a statement and, once it failed, the service's error message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementDescription {
    pub status: StatementStatus,
    pub error: Option<String>,
}

/// A single result cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
}

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Failed to submit statement: {0}")]
    Submit(String),

    #[error("Failed to describe statement {handle}: {message}")]
    Describe { handle: StatementHandle, message: String },

    #[error("Failed to fetch result of statement {handle}: {message}")]
    Fetch { handle: StatementHandle, message: String },

    #[error("Statement {handle} did not reach a terminal status within {waited:?}")]
    Timeout { handle: StatementHandle, waited: Duration },

    #[error("Unknown statement handle: {0}")]
    UnknownHandle(StatementHandle),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Asynchronous statement execution against a managed query service
pub trait QueryService {
    fn submit(&self, statement: &Statement) -> impl Future<Output = WarehouseResult<StatementHandle>> + Send;

    fn describe(&self, handle: &StatementHandle) -> impl Future<Output = WarehouseResult<StatementDescription>> + Send;

    fn fetch_rows(&self, handle: &StatementHandle) -> impl Future<Output = WarehouseResult<Vec<Vec<Cell>>>> + Send;
}

/// Submit a statement, logging what goes out
pub async fn execute<Q: QueryService>(service: &Q, statement: &Statement) -> WarehouseResult<StatementHandle> {
    tracing::info!("Executing query: {}", statement.sql().trim());

    let handle = service.submit(statement).await?;

    tracing::debug!("Statement submitted with id {}", handle);
    Ok(handle)
}
