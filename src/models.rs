/// Data Models Module
///
/// This module defines the core data structures shared by the ETL functions:
/// transformation steps, tracker vocabulary, row counts and the JSON payloads
/// exchanged with the object store notifications and the workflow orchestrator.
use serde::{Deserialize, Serialize};

/// Warehouse tier a step moves data between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Staging,
    Silver,
    Gold,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::Silver => "silver",
            Self::Gold => "gold",
        }
    }
}

/// Lifecycle status of an ETL tracker row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStatus {
    Started,
    Success,
    Failed,
}

impl TrackerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

/// Row count of a table, or the explicit absence of one when counting failed.
///
/// An unknown count is never substituted with zero, so two failed counts can
/// not reconcile by coincidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCount {
    Known(i64),
    Unknown,
}

impl RowCount {
    pub fn value(self) -> Option<i64> {
        match self {
            Self::Known(n) => Some(n),
            Self::Unknown => None,
        }
    }

    /// Sum counts across several tables. A single unknown count makes the total unknown.
    pub fn sum<I: IntoIterator<Item = RowCount>>(counts: I) -> RowCount {
        counts.into_iter().fold(RowCount::Known(0), |total, count| match (total, count) {
            (RowCount::Known(a), RowCount::Known(b)) => RowCount::Known(a + b),
            _ => RowCount::Unknown,
        })
    }
}

/// Outcome of comparing source and destination row counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReconciliationStatus {
    Match,
    Mismatch,
}

impl ReconciliationStatus {
    /// MATCH iff both counts are known and exactly equal
    pub fn from_counts(source: RowCount, destination: RowCount) -> Self {
        match (source, destination) {
            (RowCount::Known(s), RowCount::Known(d)) if s == d => Self::Match,
            _ => Self::Mismatch,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Match => "MATCH",
            Self::Mismatch => "MISMATCH",
        }
    }
}

/// One transformation the transform driver executes.
///
/// `source_table` keeps the wire format the orchestrator passes around: one or
/// more qualified table names joined by `", "`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationStep {
    pub source_table: String,
    pub destination_table: String,
    pub merge_query: String,
}

impl TransformationStep {
    pub fn new(source_tables: &[&str], destination_table: &str, merge_query: &str) -> Self {
        Self {
            source_table: source_tables.join(", "),
            destination_table: destination_table.to_string(),
            merge_query: merge_query.to_string(),
        }
    }

    /// Ordered list of source table names
    pub fn source_tables(&self) -> Vec<&str> {
        self.source_table.split(',').map(str::trim).filter(|t| !t.is_empty()).collect()
    }
}

/// Bucket and key of an object named by a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

/// Input handed to the workflow orchestrator and forwarded to every step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub s3_event: serde_json::Value,
    pub s3_bucket: String,
    pub s3_key: String,
    pub steps: Vec<TransformationStep>,
}

/// Load driver input. Extra workflow fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadRequest {
    pub s3_bucket: String,
    pub s3_key: String,
}

/// Transform driver input. Extra workflow fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformRequest {
    pub steps: Vec<TransformationStep>,
}
