/// Configuration Module
///
/// Every function builds the configuration sections it needs once per
/// invocation and passes them down explicitly. Values come from the process
/// environment (optionally seeded from a `.env` file).
use crate::warehouse::PollPolicy;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Query service connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseConfig {
    pub cluster_id: String,
    pub database: String,
    pub db_user: String,
}

impl WarehouseConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        Ok(Self {
            cluster_id: required(&lookup, "REDSHIFT_CLUSTER_ID")?,
            database: required(&lookup, "REDSHIFT_DB")?,
            db_user: required(&lookup, "DB_USER")?,
        })
    }
}

/// Bulk load target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    /// e.g. tbl_healthcare_analytics_data
    pub target_table: String,
    /// Role the warehouse assumes to read the object store
    pub iam_role: String,
}

impl LoadConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        Ok(Self { target_table: required(&lookup, "TABLE")?, iam_role: required(&lookup, "REDSHIFT_ROLE")? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub state_machine_arn: String,
}

impl WorkflowConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        Ok(Self { state_machine_arn: required(&lookup, "STEP_FUNCTION_ARN")? })
    }
}

/// Polling cadence for the status poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Interval for probes, counts, merges, tracker writes and analytics
    pub interval: Duration,
    /// Interval while waiting for a bulk COPY
    pub load_interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self { interval: Duration::from_secs(2), load_interval: Duration::from_secs(10), max_wait: Duration::from_secs(900) }
    }
}

impl PollSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            interval: seconds(&lookup, "POLL_INTERVAL_SECS")?.unwrap_or(defaults.interval),
            load_interval: seconds(&lookup, "LOAD_POLL_INTERVAL_SECS")?.unwrap_or(defaults.load_interval),
            max_wait: seconds(&lookup, "MAX_WAIT_SECS")?.unwrap_or(defaults.max_wait),
        })
    }

    /// Apply command-line overrides, given in seconds
    pub fn with_overrides(self, interval: Option<u64>, load_interval: Option<u64>, max_wait: Option<u64>) -> Self {
        Self {
            interval: interval.map(Duration::from_secs).unwrap_or(self.interval),
            load_interval: load_interval.map(Duration::from_secs).unwrap_or(self.load_interval),
            max_wait: max_wait.map(Duration::from_secs).unwrap_or(self.max_wait),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() || self.load_interval.is_zero() {
            anyhow::bail!("Poll intervals must be greater than 0");
        }

        if self.max_wait < self.interval || self.max_wait < self.load_interval {
            anyhow::bail!("Max wait ({:?}) must not be shorter than a poll interval", self.max_wait);
        }

        Ok(())
    }

    pub fn policy(&self) -> PollPolicy {
        PollPolicy::new(self.interval, self.max_wait)
    }

    pub fn load_policy(&self) -> PollPolicy {
        PollPolicy::new(self.load_interval, self.max_wait)
    }
}

fn required<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Result<String> {
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .with_context(|| format!("{} not found in environment. Please check your .env file", name))
}

fn seconds<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Result<Option<Duration>> {
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("{} must be a whole number of seconds, got {:?}", name, raw))
        })
        .transpose()
}
