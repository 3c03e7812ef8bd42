/// CLI Module
///
/// Command-line interface configuration using clap.
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Healthcare Warehouse ETL
///
/// Event-driven load, transform and analytics steps for the healthcare
/// analytics warehouse. Each command reads one JSON event and prints one JSON
/// response on stdout.
#[derive(Parser, Debug)]
#[command(name = "warehouse-etl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// JSON event file ("-" or omitted reads stdin)
    #[arg(short = 'e', long, value_name = "FILE", global = true)]
    pub event: Option<PathBuf>,

    /// Query service to run statements against
    #[arg(short = 'b', long, value_enum, default_value = "redshift", global = true)]
    pub backend: Backend,

    /// Database connection URL for the postgres backend (overrides DATABASE_URL env var)
    #[arg(short = 'd', long, value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Status poll interval in seconds (overrides POLL_INTERVAL_SECS)
    #[arg(long, value_name = "SECONDS", global = true)]
    pub poll_interval: Option<u64>,

    /// Status poll interval while waiting for a COPY, in seconds (overrides LOAD_POLL_INTERVAL_SECS)
    #[arg(long, value_name = "SECONDS", global = true)]
    pub load_poll_interval: Option<u64>,

    /// Longest wait for one statement in seconds (overrides MAX_WAIT_SECS)
    #[arg(long, value_name = "SECONDS", global = true)]
    pub max_wait: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the workflow for an object-created notification
    Trigger,
    /// Load the latest silver-layer Parquet file into the staging table
    Load,
    /// Run the gold-layer transformation steps
    Transform,
    /// Rebuild the gold reporting tables
    Analytics,
    /// Create the tracker table (postgres backend only)
    Migrate,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Redshift Data API
    Redshift,
    /// Any Postgres-wire database
    Postgres,
}

impl Cli {
    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval == Some(0) || self.load_poll_interval == Some(0) {
            anyhow::bail!("Poll interval must be greater than 0");
        }

        if self.max_wait == Some(0) {
            anyhow::bail!("Max wait must be greater than 0");
        }

        if let (Some(max_wait), Some(interval)) = (self.max_wait, self.poll_interval) {
            if max_wait < interval {
                anyhow::bail!("Max wait ({}s) must not be shorter than the poll interval ({}s)", max_wait, interval);
            }
        }

        if self.command == Command::Migrate && self.backend != Backend::Postgres {
            anyhow::bail!("The migrate command requires --backend postgres");
        }

        if self.database_url.is_some() && self.backend != Backend::Postgres {
            anyhow::bail!("--database-url only applies to the postgres backend");
        }

        Ok(())
    }

    /// Read the event from `--event` or stdin
    pub fn read_event(&self) -> anyhow::Result<Value> {
        match self.event.as_deref() {
            Some(path) if path != Path::new("-") => read_event_file(path),
            _ => {
                let mut raw = String::new();
                std::io::stdin().read_to_string(&mut raw).context("Failed to read event from stdin")?;
                parse_event(&raw)
            }
        }
    }
}

fn read_event_file(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read event file {}", path.display()))?;
    parse_event(&raw)
}

fn parse_event(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).context("Event is not valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(command: Command) -> Cli {
        Cli {
            command,
            event: None,
            backend: Backend::Redshift,
            database_url: None,
            poll_interval: None,
            load_poll_interval: None,
            max_wait: None,
        }
    }

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::try_parse_from([
            "warehouse-etl",
            "transform",
            "--event",
            "event.json",
            "--backend",
            "postgres",
            "--max-wait",
            "60",
        ])
        .unwrap();

        assert_eq!(cli.command, Command::Transform);
        assert_eq!(cli.event, Some(PathBuf::from("event.json")));
        assert_eq!(cli.backend, Backend::Postgres);
        assert_eq!(cli.max_wait, Some(60));
        assert_eq!(cli.poll_interval, None);
    }

    #[test]
    fn test_validation() {
        let mut zero_interval = cli(Command::Load);
        zero_interval.poll_interval = Some(0);
        assert!(zero_interval.validate().is_err());

        let mut short_wait = cli(Command::Transform);
        short_wait.poll_interval = Some(30);
        short_wait.max_wait = Some(10);
        assert!(short_wait.validate().is_err());

        assert!(cli(Command::Migrate).validate().is_err());

        let mut url_without_postgres = cli(Command::Analytics);
        url_without_postgres.database_url = Some("postgres://localhost/etl".into());
        assert!(url_without_postgres.validate().is_err());

        let mut migrate = cli(Command::Migrate);
        migrate.backend = Backend::Postgres;
        assert!(migrate.validate().is_ok());
    }

    #[test]
    fn test_read_event_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"s3_bucket": "b", "s3_key": "silver-layer/x.parquet"}}"#).unwrap();

        let mut cli = cli(Command::Load);
        cli.event = Some(file.path().to_path_buf());

        let event = cli.read_event().unwrap();
        assert_eq!(event["s3_key"], "silver-layer/x.parquet");
    }

    #[test]
    fn test_invalid_event_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let mut cli = cli(Command::Trigger);
        cli.event = Some(file.path().to_path_buf());

        let error = cli.read_event().unwrap_err();
        assert_eq!(error.to_string(), "Event is not valid JSON");
    }
}
