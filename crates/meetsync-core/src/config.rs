//! Pipeline configuration.
//!
//! Loaded from environment variables with defaults for everything, so an
//! empty environment yields a working in-memory pipeline.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::app::RetryPolicy;
use crate::domain::NodeId;

/// Default cache TTL (one hour).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3_600;

/// Default simulated stage delay.
pub const DEFAULT_STAGE_DELAY_MS: u64 = 2_000;

/// Default fault probability denominator (~1/11).
pub const DEFAULT_FAULT_ONE_IN: u32 = 11;

pub const DEFAULT_CONSUMERS_PER_STAGE: usize = 1;

pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;

pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// TTL of status cache entries.
    pub cache_ttl: Duration,

    /// Delay of the simulated stage work.
    pub stage_delay: Duration,

    /// Simulated work fails with probability 1/N; 0 disables faults.
    pub fault_one_in: u32,

    /// Stage work running longer than this resolves to `failed`.
    pub stage_timeout: Option<Duration>,

    /// Consumers per stage group.
    pub consumers_per_stage: usize,

    /// Retry of transient store/cache errors at the consumer boundary.
    pub retry: RetryPolicy,

    /// Identity of this process on the broadcast topic.
    pub node_id: NodeId,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            stage_delay: Duration::from_millis(DEFAULT_STAGE_DELAY_MS),
            fault_one_in: DEFAULT_FAULT_ONE_IN,
            stage_timeout: None,
            consumers_per_stage: DEFAULT_CONSUMERS_PER_STAGE,
            retry: RetryPolicy::default(),
            node_id: NodeId::generate(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

fn parse_var<T>(vars: &HashMap<String, String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    vars.get(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                name: name.to_string(),
                reason: format!("{raw:?}: {e}"),
            })
        })
        .transpose()
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let cache_ttl_seconds = parse_var(vars, "MEETSYNC_CACHE_TTL_SECONDS")?
            .unwrap_or(DEFAULT_CACHE_TTL_SECONDS);
        if cache_ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MEETSYNC_CACHE_TTL_SECONDS".into(),
                reason: "TTL must be bounded and positive".into(),
            });
        }

        let stage_delay_ms =
            parse_var(vars, "MEETSYNC_STAGE_DELAY_MS")?.unwrap_or(DEFAULT_STAGE_DELAY_MS);

        let fault_one_in =
            parse_var(vars, "MEETSYNC_FAULT_ONE_IN")?.unwrap_or(DEFAULT_FAULT_ONE_IN);

        let stage_timeout = parse_var::<u64>(vars, "MEETSYNC_STAGE_TIMEOUT_MS")?
            .map(Duration::from_millis);

        let consumers_per_stage = parse_var(vars, "MEETSYNC_CONSUMERS_PER_STAGE")?
            .unwrap_or(DEFAULT_CONSUMERS_PER_STAGE);
        if consumers_per_stage == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MEETSYNC_CONSUMERS_PER_STAGE".into(),
                reason: "every stage needs at least one consumer".into(),
            });
        }

        let max_attempts = parse_var(vars, "MEETSYNC_RETRY_MAX_ATTEMPTS")?
            .unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MEETSYNC_RETRY_MAX_ATTEMPTS".into(),
                reason: "at least one attempt is required".into(),
            });
        }
        let base_delay_ms = parse_var(vars, "MEETSYNC_RETRY_BASE_DELAY_MS")?
            .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS);
        let multiplier: f64 =
            parse_var(vars, "MEETSYNC_RETRY_MULTIPLIER")?.unwrap_or(DEFAULT_RETRY_MULTIPLIER);
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                name: "MEETSYNC_RETRY_MULTIPLIER".into(),
                reason: format!("{multiplier} is not a finite value >= 1.0"),
            });
        }

        let node_id = match vars.get("MEETSYNC_NODE_ID") {
            Some(raw) => NodeId::parse(raw).ok_or_else(|| ConfigError::InvalidValue {
                name: "MEETSYNC_NODE_ID".into(),
                reason: format!("{raw:?} is not a ULID"),
            })?,
            None => NodeId::generate(),
        };

        Ok(PipelineConfig {
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            stage_delay: Duration::from_millis(stage_delay_ms),
            fault_one_in,
            stage_timeout,
            consumers_per_stage,
            retry: RetryPolicy::new(
                max_attempts,
                Duration::from_millis(base_delay_ms),
                multiplier,
            ),
            node_id,
        })
    }
}
