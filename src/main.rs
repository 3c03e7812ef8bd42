/// Healthcare Warehouse ETL
///
/// Event-driven pipeline moving healthcare analytics data from the object
/// store into the warehouse's staging, silver and gold layers.
mod aws;
mod cli;
mod config;
mod etl;
mod models;
mod pipeline;
mod sql;
mod storage;
#[cfg(test)]
mod testing;
mod tracker;
mod warehouse;
mod workflow;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Backend, Cli, Command};
use config::{LoadConfig, PollSettings, WarehouseConfig, WorkflowConfig};
use etl::load::{LoadDriver, LoadOutcome};
use etl::transform::{TransformDriver, TransformOutcome};
use models::{LoadRequest, TransformRequest};
use serde_json::{json, Value};
use std::env;
use storage::s3::S3ObjectStore;
use warehouse::postgres::PostgresQueryService;
use warehouse::redshift::RedshiftDataService;
use warehouse::QueryService;
use workflow::StepFunctionsStarter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Logs go to stderr, stdout carries the JSON response only
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    cli.validate().context("Invalid arguments")?;

    let polling = PollSettings::from_env()
        .context("Failed to read poll settings")?
        .with_overrides(cli.poll_interval, cli.load_poll_interval, cli.max_wait);
    polling.validate()?;

    tracing::info!("🚀 Running {:?} against {:?}", cli.command, cli.backend);

    let response = match cli.command {
        Command::Trigger => {
            let event = cli.read_event()?;
            let config = WorkflowConfig::from_env()?;
            let starter = StepFunctionsStarter::new(&config).await;

            serde_json::to_value(etl::trigger::handle(&starter, event).await?)?
        }
        Command::Migrate => {
            let database = connect_postgres(&cli).await?;
            database.migrate().await?;

            json!({"status": "Tracker table ready"})
        }
        command => {
            let event = cli.read_event()?;

            match cli.backend {
                Backend::Redshift => {
                    let config = WarehouseConfig::from_env()?;
                    let service = RedshiftDataService::new(&config).await;
                    run_warehouse_command(&service, command, event, polling).await?
                }
                Backend::Postgres => {
                    let service = connect_postgres(&cli).await?;
                    run_warehouse_command(&service, command, event, polling).await?
                }
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

async fn connect_postgres(cli: &Cli) -> Result<PostgresQueryService> {
    let database_url = match &cli.database_url {
        Some(url) => url.clone(),
        None => env::var("DATABASE_URL").context("DATABASE_URL not found in environment. Please check your .env file")?,
    };

    let database = PostgresQueryService::connect(&database_url).await.context("Failed to connect to PostgreSQL database")?;
    database.test_connection().await.context("Database connection test failed")?;
    tracing::info!("✅ Database connected successfully!");

    Ok(database)
}

/// Run one of the warehouse-side functions and return its JSON response
async fn run_warehouse_command<Q: QueryService>(
    service: &Q,
    command: Command,
    event: Value,
    polling: PollSettings,
) -> Result<Value> {
    match command {
        Command::Load => {
            let request: LoadRequest = match serde_json::from_value(event) {
                Ok(request) => request,
                Err(e) => {
                    tracing::error!("Invalid load request: {}", e);
                    let outcome = LoadOutcome::Error { message: format!("Invalid load request: {}", e) };
                    return Ok(serde_json::to_value(outcome)?);
                }
            };

            let config = LoadConfig::from_env()?;
            let store = S3ObjectStore::new().await;
            let outcome = LoadDriver::new(service, &store, &config, polling).run(&request).await;

            Ok(serde_json::to_value(outcome)?)
        }
        Command::Transform => {
            let request: TransformRequest = match serde_json::from_value(event) {
                Ok(request) => request,
                Err(e) => {
                    tracing::error!("Invalid transform request: {}", e);
                    let outcome = TransformOutcome::Error { message: format!("Invalid transform request: {}", e) };
                    return Ok(serde_json::to_value(outcome)?);
                }
            };

            let (outcome, _stats) = TransformDriver::new(service, polling.policy()).run(&request.steps).await;

            Ok(serde_json::to_value(outcome)?)
        }
        Command::Analytics => {
            let response = etl::analytics::handle(service, polling.policy()).await?;

            Ok(serde_json::to_value(response)?)
        }
        Command::Trigger | Command::Migrate => anyhow::bail!("{:?} does not run against the warehouse", command),
    }
}
