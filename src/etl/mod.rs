/// ETL Pipeline Module
///
/// The four event-driven functions of the healthcare warehouse pipeline:
/// - Trigger: Start the orchestrated workflow for an arriving object
/// - Load: Bulk load the latest silver-layer Parquet file into staging
/// - Transform: Build the gold dimensions and fact table with reconciliation
/// - Analytics: Rebuild the gold reporting tables
pub mod analytics;
pub mod load;
pub mod transform;
pub mod trigger;
