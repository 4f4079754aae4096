use std::time::Duration;

use super::file::TrackerSection;
use super::helpers::{parse_env, parse_millis_env, parse_secs_env};
use crate::error::ConfigError;

/// Bounds on transaction tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Longest wait for finality before the transaction is reported failed.
    pub confirmation_timeout: Duration,
    /// Block lookups attempted per confirmed transaction.
    pub block_lookup_attempts: u32,
    /// Base delay between lookups; attempt `n` waits `n * backoff`.
    pub block_lookup_backoff: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(60),
            block_lookup_attempts: 3,
            block_lookup_backoff: Duration::from_millis(500),
        }
    }
}

impl TrackerConfig {
    pub(crate) fn resolve(file: &TrackerSection) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let confirmation_timeout = parse_secs_env(
            "COPILOT_CONFIRMATION_TIMEOUT_SECS",
            file.confirmation_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.confirmation_timeout),
        )?;
        if confirmation_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "COPILOT_CONFIRMATION_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let block_lookup_attempts = parse_env(
            "COPILOT_BLOCK_LOOKUP_ATTEMPTS",
            file.block_lookup_attempts
                .unwrap_or(defaults.block_lookup_attempts),
        )?;
        if block_lookup_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "COPILOT_BLOCK_LOOKUP_ATTEMPTS".to_string(),
                message: "at least one attempt is required".to_string(),
            });
        }

        Ok(Self {
            confirmation_timeout,
            block_lookup_attempts,
            block_lookup_backoff: parse_millis_env(
                "COPILOT_BLOCK_LOOKUP_BACKOFF_MS",
                file.block_lookup_backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.block_lookup_backoff),
            )?,
        })
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.block_lookup_backoff.saturating_mul(attempt)
    }
}
