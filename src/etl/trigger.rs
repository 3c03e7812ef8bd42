/// Trigger Module
///
/// Reacts to an "object created" notification by starting the warehouse
/// workflow with the fixed list of gold-layer transformation steps. No key
/// filtering happens here; the load driver decides whether a file is admitted.
use crate::models::{ObjectLocation, TransformationStep, WorkflowInput};
use crate::workflow::WorkflowStarter;
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

/// Cleaned source every dimension is built from
pub const SILVER_SOURCE_TABLE: &str = "silver.tbl_healthcare_analytics_data";

pub const FACT_TABLE: &str = "gold.fact_treatments";

/// Dimension tables, in build order
pub const DIMENSION_TABLES: [&str; 8] = [
    "gold.dim_dates",
    "gold.dim_times",
    "gold.dim_treatment_types_and_outcome_statuses",
    "gold.dim_locations",
    "gold.dim_specialities",
    "gold.dim_providers",
    "gold.dim_patients",
    "gold.dim_diseases",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TriggerResponse {
    Started {
        status: String,
        #[serde(rename = "executionArn")]
        execution_arn: String,
    },
    MissingKey {
        error: String,
    },
}

/// Stored procedure populating a gold table: `gold.dim_dates` -> `CALL silver.sp_populate_dim_dates();`
fn populate_call(destination_table: &str) -> String {
    let table = destination_table.rsplit('.').next().unwrap_or(destination_table);
    format!("CALL silver.sp_populate_{}();", table)
}

/// The eight dimension builds followed by the fact table build
pub fn gold_layer_steps() -> Vec<TransformationStep> {
    let mut steps: Vec<TransformationStep> = DIMENSION_TABLES
        .iter()
        .map(|dimension| TransformationStep::new(&[SILVER_SOURCE_TABLE], dimension, &populate_call(dimension)))
        .collect();

    steps.push(TransformationStep::new(&DIMENSION_TABLES, FACT_TABLE, &populate_call(FACT_TABLE)));
    steps
}

/// Bucket and key of the first record, naming the first missing field
pub fn extract_location(event: &Value) -> Result<ObjectLocation, String> {
    let record = event.get("Records").ok_or("Records")?.get(0).ok_or("Records[0]")?;
    let s3 = record.get("s3").ok_or("s3")?;

    let bucket = s3.get("bucket").ok_or("bucket")?.get("name").and_then(Value::as_str).ok_or("name")?;
    let key = s3.get("object").ok_or("object")?.get("key").and_then(Value::as_str).ok_or("key")?;

    Ok(ObjectLocation { bucket: bucket.to_string(), key: key.to_string() })
}

pub async fn handle<W: WorkflowStarter>(starter: &W, event: Value) -> Result<TriggerResponse> {
    tracing::info!("Received Event: {}", event);

    let location = match extract_location(&event) {
        Ok(location) => location,
        Err(field) => {
            tracing::error!("Notification is missing {}", field);
            return Ok(TriggerResponse::MissingKey { error: format!("Missing key: {}", field) });
        }
    };

    tracing::info!("Bucket: {}", location.bucket);
    tracing::info!("File: {}", location.key);

    let input =
        WorkflowInput { s3_event: event, s3_bucket: location.bucket, s3_key: location.key, steps: gold_layer_steps() };

    tracing::debug!("Step Function input: {}", serde_json::to_string(&input)?);

    let execution_arn = starter.start_execution(&input).await?;
    tracing::info!("Step Function started successfully: {}", execution_arn);

    Ok(TriggerResponse::Started { status: "Step Function Started".to_string(), execution_arn })
}
