//! Configuration types.
//!
//! Everything is read from the environment (after an optional `.env`) with
//! defaults. `from_lookup` constructors take the variable source as a closure
//! so they can be exercised without touching the process environment.

use std::str::FromStr;
use std::time::Duration;

use uuid::Uuid;

use crate::agent::PoolConfig;
use crate::calc::{Operator, ParseOptions};
use crate::error::ConfigError;

/// Load `.env` into the process environment; a missing file is fine.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Simulated execution time per operator, handed to workers with each task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimings {
    pub addition: Duration,
    pub subtraction: Duration,
    pub multiplication: Duration,
    pub division: Duration,
}

impl OperationTimings {
    /// Same duration for every operator.
    pub fn uniform(duration: Duration) -> Self {
        Self {
            addition: duration,
            subtraction: duration,
            multiplication: duration,
            division: duration,
        }
    }

    pub fn for_operator(&self, operator: Operator) -> Duration {
        match operator {
            Operator::Add => self.addition,
            Operator::Sub => self.subtraction,
            Operator::Mul => self.multiplication,
            Operator::Div => self.division,
        }
    }
}

impl Default for OperationTimings {
    fn default() -> Self {
        Self {
            addition: Duration::from_millis(2000),
            subtraction: Duration::from_millis(2000),
            multiplication: Duration::from_millis(4000),
            division: Duration::from_millis(4000),
        }
    }
}

/// Scheduler construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub timings: OperationTimings,
    /// Fixed lease latency; a lease lasts this plus the task's operation time.
    pub base_timeout: Duration,
    pub parse: ParseOptions,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timings: OperationTimings::default(),
            base_timeout: Duration::from_secs(10),
            parse: ParseOptions::default(),
        }
    }
}

/// Orchestrator process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub host: String,
    pub port: u16,
    pub scheduler: SchedulerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let timings = defaults.scheduler.timings;

        Ok(Self {
            host: lookup("ORCHESTRATOR_HOST").unwrap_or(defaults.host),
            port: read(&lookup, "ORCHESTRATOR_PORT", defaults.port)?,
            scheduler: SchedulerConfig {
                timings: OperationTimings {
                    addition: read_millis(&lookup, "TIME_ADDITION_MS", timings.addition)?,
                    subtraction: read_millis(&lookup, "TIME_SUBTRACTION_MS", timings.subtraction)?,
                    multiplication: read_millis(
                        &lookup,
                        "TIME_MULTIPLICATIONS_MS",
                        timings.multiplication,
                    )?,
                    division: read_millis(&lookup, "TIME_DIVISIONS_MS", timings.division)?,
                },
                base_timeout: read_millis(
                    &lookup,
                    "TASK_BASE_TIMEOUT_MS",
                    defaults.scheduler.base_timeout,
                )?,
                parse: ParseOptions {
                    reject_zero_divisor: read_bool(
                        &lookup,
                        "REJECT_ZERO_DIVISOR",
                        defaults.scheduler.parse.reject_zero_divisor,
                    )?,
                },
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Agent process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Base URL of the orchestrator, e.g. `http://127.0.0.1:8080`.
    pub orchestrator_url: String,
    /// Sent as `x-agent-id`; recorded as the lease holder.
    pub agent_id: String,
    pub pool: PoolConfig,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = PoolConfig::default();

        let concurrency: usize = read(&lookup, "COMPUTING_POWER", defaults.concurrency)?;
        if concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "COMPUTING_POWER".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let pool = PoolConfig {
            concurrency,
            poll_backoff: read_millis(&lookup, "AGENT_POLL_BACKOFF_MS", defaults.poll_backoff)?,
            max_backoff: read_millis(&lookup, "AGENT_MAX_BACKOFF_MS", defaults.max_backoff)?,
        };

        Ok(Self {
            orchestrator_url: lookup("ORCHESTRATOR_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            agent_id: lookup("AGENT_ID").unwrap_or_else(|| Uuid::new_v4().to_string()),
            pool,
        })
    }
}

fn read<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn read_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let millis: u64 = read(lookup, key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

fn read_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "TRUE" | "yes") => Ok(true),
        Some("0" | "false" | "FALSE" | "no") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}
