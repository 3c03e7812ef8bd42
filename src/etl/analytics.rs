/// Analytics Module
///
/// Rebuilds the gold reporting tables from the fact and dimension tables.
/// Statements run in order and independently: a failure is recorded and the
/// next statement still runs. The tracker is not involved.
use crate::warehouse::{execute, wait_for_statement, PollPolicy, QueryService, StatementStatus};
use serde::Serialize;

/// Drop-and-rebuild statements for the reporting tables
pub const ANALYTICAL_QUERIES: [&str; 7] = [
    "DROP TABLE IF EXISTS gold.provider_treatment_rank; CREATE TABLE gold.provider_treatment_rank AS SELECT p.provider_sk AS provider_id, p.full_name AS provider_full_name, COUNT(f.fact_treatment_sk) AS total_treatments FROM gold.fact_treatments f JOIN gold.dim_providers p ON f.provider_sk = p.provider_sk GROUP BY p.provider_sk, p.full_name ORDER BY total_treatments DESC;",
    "DROP TABLE IF EXISTS gold.provider_success_rate_rank; CREATE TABLE gold.provider_success_rate_rank AS SELECT p.provider_sk AS provider_id, p.full_name AS provider_full_name, COUNT(f.fact_treatment_sk) AS total_treatments, COUNT(CASE WHEN f.treatment_type_and_outcome_status_sk = 1 THEN 1 END) * 100.0 / COUNT(f.fact_treatment_sk) AS success_rate FROM gold.fact_treatments f JOIN gold.dim_providers p ON f.provider_sk = p.provider_sk GROUP BY p.provider_sk, p.full_name ORDER BY success_rate DESC;",
    "DROP TABLE IF EXISTS gold.monthly_treatment_trends; CREATE TABLE gold.monthly_treatment_trends AS SELECT d.year, d.month, COUNT(f.fact_treatment_sk) AS total_treatments, COUNT(CASE WHEN f.treatment_type_and_outcome_status_sk = 1 THEN 1 END) * 100.0 / COUNT(f.fact_treatment_sk) AS success_rate FROM gold.fact_treatments f JOIN gold.dim_dates d ON f.start_date_sk = d.date_sk GROUP BY d.year, d.month ORDER BY d.year DESC, d.month DESC;",
    "DROP TABLE IF EXISTS gold.geographical_treatment_distribution; CREATE TABLE gold.geographical_treatment_distribution AS SELECT l.country, l.state, l.city, COUNT(f.fact_treatment_sk) AS total_treatments FROM gold.fact_treatments f JOIN gold.dim_locations l ON f.location_sk = l.location_sk GROUP BY l.country, l.state, l.city ORDER BY total_treatments DESC;",
    "DROP TABLE IF EXISTS gold.summary_avg_treatment_cost; CREATE TABLE gold.summary_avg_treatment_cost AS SELECT p.provider_sk AS provider_id, p.full_name AS provider_full_name, AVG(f.cost) AS avg_treatment_cost FROM gold.fact_treatments f JOIN gold.dim_providers p ON f.provider_sk = p.provider_sk GROUP BY p.provider_sk, p.full_name;",
    "DROP TABLE IF EXISTS gold.summary_total_treatments_per_city; CREATE TABLE gold.summary_total_treatments_per_city AS SELECT l.city, COUNT(f.fact_treatment_sk) AS total_treatments FROM gold.fact_treatments f JOIN gold.dim_locations l ON f.location_sk = l.location_sk GROUP BY l.city ORDER BY total_treatments DESC;",
    "DROP TABLE IF EXISTS gold.summary_provider_success_rates; CREATE TABLE gold.summary_provider_success_rates AS SELECT p.provider_sk AS provider_id, p.full_name AS provider_full_name, COUNT(f.fact_treatment_sk) AS total_treatments, COUNT(CASE WHEN f.treatment_type_and_outcome_status_sk = 1 THEN 1 END) * 100.0 / COUNT(f.fact_treatment_sk) AS success_rate FROM gold.fact_treatments f JOIN gold.dim_providers p ON f.provider_sk = p.provider_sk GROUP BY p.provider_sk, p.full_name;",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryStatus {
    Success,
    Failed,
}

/// Outcome of one analytical statement.
///
/// Statements that got a handle report `query_id`; statements that could not
/// be submitted or polled report their `query` text instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub status: QueryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON-encoded list of `QueryResult`
    pub body: String,
}

pub async fn run_queries<Q: QueryService>(warehouse: &Q, queries: &[&str], policy: PollPolicy) -> Vec<QueryResult> {
    let mut results = Vec::with_capacity(queries.len());

    for (index, query) in queries.iter().enumerate() {
        let result = run_query(warehouse, query, policy).await;
        if result.status == QueryStatus::Failed {
            tracing::warn!(
                "Analytical query {}/{} failed: {}",
                index + 1,
                queries.len(),
                result.error.as_deref().unwrap_or("Unknown error")
            );
        }
        results.push(result);
    }

    let failed = results.iter().filter(|r| r.status == QueryStatus::Failed).count();
    tracing::info!("Analytical queries complete: {} succeeded, {} failed", results.len() - failed, failed);

    results
}

async fn run_query<Q: QueryService>(warehouse: &Q, query: &str, policy: PollPolicy) -> QueryResult {
    let statement = crate::warehouse::Statement::new(query);

    let outcome = match execute(warehouse, &statement).await {
        Ok(handle) => wait_for_statement(warehouse, &handle, policy).await.map(|description| (handle, description)),
        Err(e) => Err(e),
    };

    match outcome {
        Ok((handle, description)) if description.status == StatementStatus::Finished => {
            QueryResult { query_id: Some(handle.to_string()), query: None, status: QueryStatus::Success, error: None }
        }
        Ok((handle, description)) => QueryResult {
            query_id: Some(handle.to_string()),
            query: None,
            status: QueryStatus::Failed,
            error: Some(description.error.unwrap_or_else(|| "Unknown error".to_string())),
        },
        Err(e) => QueryResult {
            query_id: None,
            query: Some(query.to_string()),
            status: QueryStatus::Failed,
            error: Some(e.to_string()),
        },
    }
}

pub async fn handle<Q: QueryService>(warehouse: &Q, policy: PollPolicy) -> anyhow::Result<AnalyticsResponse> {
    let results = run_queries(warehouse, &ANALYTICAL_QUERIES, policy).await;

    Ok(AnalyticsResponse { status_code: 200, body: serde_json::to_string(&results)? })
}
