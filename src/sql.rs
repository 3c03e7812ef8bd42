/// SQL Module
///
/// Identifier validation and the statement templates shared by the drivers.
/// Every table name, bucket, key and role that ends up interpolated into SQL
/// text goes through an allow-list here first; plain values are bound as
/// statement parameters instead.
use crate::warehouse::Statement;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*){0,2}$").unwrap());

static BUCKET_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9.\-]{1,61}[a-z0-9]$").unwrap());

static OBJECT_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9!_.*()/=+,@&$:;\- ]{1,1024}$").unwrap());

static IAM_ROLE_ARN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^arn:aws[a-z\-]*:iam::[0-9]{12}:role/[A-Za-z0-9+=,.@_\-/]{1,512}$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SqlError {
    #[error("Invalid table identifier: {0:?}")]
    InvalidTableName(String),

    #[error("Invalid bucket name: {0:?}")]
    InvalidBucket(String),

    #[error("Invalid object key: {0:?}")]
    InvalidObjectKey(String),

    #[error("Invalid IAM role ARN: {0:?}")]
    InvalidIamRole(String),
}

/// A validated `[database.][schema.]table` identifier, safe to interpolate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn parse(raw: &str) -> Result<Self, SqlError> {
        let trimmed = raw.trim();
        if TABLE_NAME.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(SqlError::InvalidTableName(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connectivity probe issued before a transformation run
pub fn probe() -> Statement {
    Statement::new("SELECT 1;")
}

/// `SELECT COUNT(*)` over a validated table
pub fn count_rows(table: &TableName) -> Statement {
    Statement::new(format!("SELECT COUNT(*) FROM {};", table))
}

/// Bulk load of one Parquet object into a table.
///
/// COPY takes its source and credentials as literals, so they are validated
/// against a restricted character set rather than bound.
pub fn copy_parquet(table: &TableName, bucket: &str, key: &str, iam_role: &str) -> Result<Statement, SqlError> {
    if !BUCKET_NAME.is_match(bucket) {
        return Err(SqlError::InvalidBucket(bucket.to_string()));
    }
    if !OBJECT_KEY.is_match(key) {
        return Err(SqlError::InvalidObjectKey(key.to_string()));
    }
    if !IAM_ROLE_ARN.is_match(iam_role) {
        return Err(SqlError::InvalidIamRole(iam_role.to_string()));
    }

    Ok(Statement::new(format!(
        "COPY {} FROM 's3://{}/{}' IAM_ROLE '{}' FORMAT AS PARQUET;",
        table, bucket, key, iam_role
    )))
}
