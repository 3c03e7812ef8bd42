//! In-memory doubles for the external services, used by the unit tests.
use crate::models::WorkflowInput;
use crate::storage::{ObjectStore, ObjectSummary};
use crate::warehouse::{
    Cell, QueryService, Statement, StatementDescription, StatementHandle, StatementStatus, WarehouseError,
    WarehouseResult,
};
use crate::workflow::WorkflowStarter;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// How a scripted statement behaves once submitted
#[derive(Debug, Clone)]
pub enum Outcome {
    Finished(Vec<Vec<Cell>>),
    /// Reports STARTED for the given number of polls, then FINISHED
    FinishedAfter(usize, Vec<Vec<Cell>>),
    Failed(String),
    Aborted,
    /// Never leaves STARTED
    Running,
    SubmitError(String),
    /// Finishes, but its result can not be fetched
    FetchError(String),
}

#[derive(Debug)]
struct Submitted {
    outcome: Outcome,
    polls: usize,
}

#[derive(Debug, Default)]
struct Inner {
    rules: Vec<(String, Outcome)>,
    statements: Vec<Statement>,
    handles: HashMap<String, Submitted>,
    describe_calls: usize,
}

/// Query service whose statements behave according to substring rules.
/// The first rule contained in the SQL text wins; unmatched statements finish with no rows.
#[derive(Debug, Default)]
pub struct ScriptedWarehouse {
    inner: Mutex<Inner>,
}

impl ScriptedWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, pattern: &str, outcome: Outcome) -> Self {
        self.inner.lock().unwrap().rules.push((pattern.to_string(), outcome));
        self
    }

    pub fn with_count(self, table: &str, count: i64) -> Self {
        self.on(&format!("SELECT COUNT(*) FROM {};", table), Outcome::Finished(vec![vec![Cell::Long(count)]]))
    }

    /// Every statement submitted so far, in order
    pub fn statements(&self) -> Vec<Statement> {
        self.inner.lock().unwrap().statements.clone()
    }

    pub fn submitted_sql(&self) -> Vec<String> {
        self.statements().iter().map(|s| s.sql().to_string()).collect()
    }

    pub fn describe_calls(&self) -> usize {
        self.inner.lock().unwrap().describe_calls
    }
}

impl QueryService for ScriptedWarehouse {
    async fn submit(&self, statement: &Statement) -> WarehouseResult<StatementHandle> {
        let mut inner = self.inner.lock().unwrap();
        inner.statements.push(statement.clone());

        let outcome = inner
            .rules
            .iter()
            .find(|(pattern, _)| statement.sql().contains(pattern.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or(Outcome::Finished(Vec::new()));

        if let Outcome::SubmitError(message) = &outcome {
            return Err(WarehouseError::Submit(message.clone()));
        }

        let id = format!("stmt-{}", inner.statements.len());
        inner.handles.insert(id.clone(), Submitted { outcome, polls: 0 });
        Ok(StatementHandle::new(id))
    }

    async fn describe(&self, handle: &StatementHandle) -> WarehouseResult<StatementDescription> {
        let mut inner = self.inner.lock().unwrap();
        inner.describe_calls += 1;

        let submitted =
            inner.handles.get_mut(handle.as_str()).ok_or_else(|| WarehouseError::UnknownHandle(handle.clone()))?;
        submitted.polls += 1;

        let (status, error) = match &submitted.outcome {
            Outcome::FinishedAfter(running, _) if submitted.polls <= *running => (StatementStatus::Started, None),
            Outcome::Running => (StatementStatus::Started, None),
            Outcome::Failed(message) => (StatementStatus::Failed, Some(message.clone())),
            Outcome::Aborted => (StatementStatus::Aborted, None),
            _ => (StatementStatus::Finished, None),
        };

        Ok(StatementDescription { status, error })
    }

    async fn fetch_rows(&self, handle: &StatementHandle) -> WarehouseResult<Vec<Vec<Cell>>> {
        let inner = self.inner.lock().unwrap();
        let submitted = inner.handles.get(handle.as_str()).ok_or_else(|| WarehouseError::UnknownHandle(handle.clone()))?;

        match &submitted.outcome {
            Outcome::Finished(rows) | Outcome::FinishedAfter(_, rows) => Ok(rows.clone()),
            Outcome::FetchError(message) => {
                Err(WarehouseError::Fetch { handle: handle.clone(), message: message.clone() })
            }
            _ => Err(WarehouseError::Fetch { handle: handle.clone(), message: "statement has no result".into() }),
        }
    }
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
}

/// Object store holding a fixed listing
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Vec<ObjectSummary>,
    fail: Option<String>,
    listings: Mutex<Vec<(String, String)>>,
}

impl MemoryObjectStore {
    pub fn new(objects: &[(&str, DateTime<Utc>)]) -> Self {
        let objects =
            objects.iter().map(|(key, last_modified)| ObjectSummary { key: key.to_string(), last_modified: *last_modified });
        Self { objects: objects.collect(), ..Self::default() }
    }

    pub fn failing(message: &str) -> Self {
        Self { fail: Some(message.to_string()), ..Self::default() }
    }

    /// (bucket, prefix) of every listing request
    pub fn listings(&self) -> Vec<(String, String)> {
        self.listings.lock().unwrap().clone()
    }
}

impl ObjectStore for MemoryObjectStore {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> anyhow::Result<Vec<ObjectSummary>> {
        self.listings.lock().unwrap().push((bucket.to_string(), prefix.to_string()));

        if let Some(message) = &self.fail {
            anyhow::bail!("{}", message);
        }

        Ok(self.objects.iter().filter(|o| o.key.starts_with(prefix)).cloned().collect())
    }
}

/// Workflow starter that records its inputs
#[derive(Debug, Default)]
pub struct RecordingStarter {
    inputs: Mutex<Vec<WorkflowInput>>,
}

impl RecordingStarter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inputs(&self) -> Vec<WorkflowInput> {
        self.inputs.lock().unwrap().clone()
    }
}

impl WorkflowStarter for RecordingStarter {
    async fn start_execution(&self, input: &WorkflowInput) -> anyhow::Result<String> {
        let mut inputs = self.inputs.lock().unwrap();
        inputs.push(input.clone());
        Ok(format!("arn:aws:states:us-east-1:123456789012:execution:etl:run-{}", inputs.len()))
    }
}
