use crate::retry::{
    validate_max_attempts, ConstantBackoff, DelayStrategy, ExponentialBackoff, LinearBackoff,
    RetryPolicy,
};
use fetch_shield_core::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Pipeline settings as they appear in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Total attempts per sequence, including the first.
    pub max_attempts: usize,

    pub backoff: BackoffConfig,

    /// Share one attempt sequence among concurrent identical calls.
    pub dedupe_enabled: bool,

    /// Record successes and fall back to them on exhaustion.
    pub cache_enabled: bool,

    /// Buffer size of the retry event broadcast channel.
    pub retry_channel_capacity: usize,

    /// Log every retry through `tracing`.
    pub log_retries: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
            dedupe_enabled: true,
            cache_enabled: true,
            retry_channel_capacity: 64,
            log_retries: true,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        validate_max_attempts(self.max_attempts)?;
        if self.retry_channel_capacity == 0 {
            return Err(PipelineError::configuration(
                "retry_channel_capacity must be at least 1",
            ));
        }
        self.backoff.validate()
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        self.validate()?;
        RetryPolicy::from_shared(self.max_attempts, self.backoff.strategy())
    }
}

/// Delay strategy selection, tagged by `strategy`.
///
/// ```toml
/// [pipeline.backoff]
/// strategy = "exponential"
/// initial_ms = 100
/// multiplier = 2.0
/// max_ms = 5000
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackoffConfig {
    Linear {
        interval_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_delay_ms: Option<u64>,
    },
    Constant {
        delay_ms: u64,
    },
    Exponential {
        initial_ms: u64,
        multiplier: f64,
        max_ms: u64,
    },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Linear {
            interval_ms: 250,
            max_delay_ms: None,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<()> {
        match *self {
            BackoffConfig::Exponential {
                initial_ms,
                multiplier,
                max_ms,
            } => {
                if !multiplier.is_finite() || multiplier < 1.0 {
                    return Err(PipelineError::configuration(
                        "backoff multiplier must be a finite number >= 1.0",
                    ));
                }
                if max_ms < initial_ms {
                    return Err(PipelineError::configuration(
                        "backoff max_ms must not be below initial_ms",
                    ));
                }
                Ok(())
            }
            BackoffConfig::Linear {
                interval_ms,
                max_delay_ms: Some(max),
            } if max < interval_ms => Err(PipelineError::configuration(
                "backoff max_delay_ms must not be below interval_ms",
            )),
            _ => Ok(()),
        }
    }

    pub fn strategy(&self) -> Arc<dyn DelayStrategy> {
        match *self {
            BackoffConfig::Linear {
                interval_ms,
                max_delay_ms,
            } => {
                let linear = LinearBackoff::new(Duration::from_millis(interval_ms));
                match max_delay_ms {
                    Some(max) => Arc::new(linear.with_max_delay(Duration::from_millis(max))),
                    None => Arc::new(linear),
                }
            }
            BackoffConfig::Constant { delay_ms } => {
                Arc::new(ConstantBackoff::new(Duration::from_millis(delay_ms)))
            }
            BackoffConfig::Exponential {
                initial_ms,
                multiplier,
                max_ms,
            } => Arc::new(ExponentialBackoff::new(
                Duration::from_millis(initial_ms),
                multiplier,
                Duration::from_millis(max_ms),
            )),
        }
    }
}
