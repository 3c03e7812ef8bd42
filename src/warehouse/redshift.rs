/// Redshift Data API backend
///
/// Submits statements with `ExecuteStatement`, polls them with
/// `DescribeStatement` and reads results with `GetStatementResult`. Named
/// statement parameters are forwarded as `SqlParameter`s.
use super::{Cell, QueryService, Statement, StatementDescription, StatementHandle, StatementStatus};
use super::{WarehouseError, WarehouseResult};
use crate::config::WarehouseConfig;
use aws_sdk_redshiftdata::error::DisplayErrorContext;
use aws_sdk_redshiftdata::types::{Field, SqlParameter};
use aws_sdk_redshiftdata::Client;

#[derive(Clone)]
pub struct RedshiftDataService {
    client: Client,
    cluster_id: String,
    database: String,
    db_user: String,
}

impl RedshiftDataService {
    /// Create a service using the default AWS credential chain
    pub async fn new(config: &WarehouseConfig) -> Self {
        let sdk_config = crate::aws::load_sdk_config().await;
        Self::with_client(Client::new(&sdk_config), config)
    }

    pub fn with_client(client: Client, config: &WarehouseConfig) -> Self {
        Self {
            client,
            cluster_id: config.cluster_id.clone(),
            database: config.database.clone(),
            db_user: config.db_user.clone(),
        }
    }
}

impl QueryService for RedshiftDataService {
    async fn submit(&self, statement: &Statement) -> WarehouseResult<StatementHandle> {
        let mut request = self
            .client
            .execute_statement()
            .cluster_identifier(&self.cluster_id)
            .database(&self.database)
            .db_user(&self.db_user)
            .sql(statement.sql());

        for (name, value) in statement.params() {
            let parameter = SqlParameter::builder()
                .name(name)
                .value(value)
                .build()
                .map_err(|e| WarehouseError::Submit(format!("invalid parameter {}: {}", name, e)))?;
            request = request.parameters(parameter);
        }

        let response =
            request.send().await.map_err(|e| WarehouseError::Submit(DisplayErrorContext(&e).to_string()))?;

        response
            .id()
            .map(StatementHandle::new)
            .ok_or_else(|| WarehouseError::Submit("ExecuteStatement returned no statement id".to_string()))
    }

    async fn describe(&self, handle: &StatementHandle) -> WarehouseResult<StatementDescription> {
        let response = self.client.describe_statement().id(handle.as_str()).send().await.map_err(|e| {
            WarehouseError::Describe { handle: handle.clone(), message: DisplayErrorContext(&e).to_string() }
        })?;

        let raw_status = response.status().map(|s| s.as_str()).unwrap_or("SUBMITTED");
        let status = StatementStatus::parse(raw_status).ok_or_else(|| WarehouseError::Describe {
            handle: handle.clone(),
            message: format!("unexpected statement status {}", raw_status),
        })?;

        Ok(StatementDescription { status, error: response.error().map(str::to_string) })
    }

    async fn fetch_rows(&self, handle: &StatementHandle) -> WarehouseResult<Vec<Vec<Cell>>> {
        let response = self.client.get_statement_result().id(handle.as_str()).send().await.map_err(|e| {
            WarehouseError::Fetch { handle: handle.clone(), message: DisplayErrorContext(&e).to_string() }
        })?;

        Ok(response.records().iter().map(|record| record.iter().map(field_to_cell).collect()).collect())
    }
}

fn field_to_cell(field: &Field) -> Cell {
    match field {
        Field::LongValue(n) => Cell::Long(*n),
        Field::DoubleValue(n) => Cell::Double(*n),
        Field::BooleanValue(b) => Cell::Bool(*b),
        Field::StringValue(s) => Cell::Text(s.clone()),
        _ => Cell::Null,
    }
}
