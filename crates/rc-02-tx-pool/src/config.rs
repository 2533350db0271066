//! Pool configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{warn, Span};

/// Configuration rejected by [`PoolConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("max_atomic_group_size {0} outside 2..=255")]
    GroupSize(usize),

    #[error("{key}={value:?} is not a valid setting")]
    Malformed { key: &'static str, value: String },
}

/// Transaction pool configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool size above which old Pending rows are evicted by purge.
    pub max_txs: usize,
    /// Age (seconds) after which a Pending row may be evicted.
    pub ttl_secs: u64,
    /// Batches a Forged/Invalid row is kept, and the deepest accepted reorg.
    pub safety_period: u64,
    /// Upper bound on `select_batch`.
    pub max_batch_size: usize,
    /// Largest atomic group admitted.
    pub max_atomic_group_size: usize,
    /// Period of the background purge task (seconds).
    pub purge_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_txs: 256_000,
            ttl_secs: 86_400, // 24 hours
            safety_period: 10,
            max_batch_size: 2_048,
            max_atomic_group_size: 8,
            purge_interval_secs: 60,
        }
    }
}

impl PoolConfig {
    /// Small limits for tests.
    pub fn for_testing() -> Self {
        Self {
            max_txs: 100,
            ttl_secs: 60,
            safety_period: 2,
            max_batch_size: 16,
            purge_interval_secs: 1,
            ..Default::default()
        }
    }

    /// Defaults overridden by environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RC_POOL_MAX_TXS`
    /// - `RC_POOL_TTL_SECS`
    /// - `RC_POOL_SAFETY_PERIOD`
    /// - `RC_POOL_MAX_BATCH_SIZE`
    /// - `RC_POOL_MAX_ATOMIC_GROUP_SIZE`
    /// - `RC_POOL_PURGE_INTERVAL_SECS`
    ///
    /// Unparseable values are ignored with a warning under `span`.
    pub fn from_env(span: &Span) -> Self {
        let (config, rejected) = Self::from_env_checked();
        for error in &rejected {
            warn!(parent: span, error = %error, "Ignoring malformed pool setting");
        }
        config
    }

    /// [`PoolConfig::from_env`] without logging: the unparseable settings
    /// are returned next to the config, which keeps their defaults.
    pub fn from_env_checked() -> (Self, Vec<ConfigError>) {
        let mut config = Self::default();
        let mut rejected = Vec::new();
        let r = &mut rejected;
        override_from_env("RC_POOL_MAX_TXS", &mut config.max_txs, r);
        override_from_env("RC_POOL_TTL_SECS", &mut config.ttl_secs, r);
        override_from_env("RC_POOL_SAFETY_PERIOD", &mut config.safety_period, r);
        override_from_env("RC_POOL_MAX_BATCH_SIZE", &mut config.max_batch_size, r);
        override_from_env(
            "RC_POOL_MAX_ATOMIC_GROUP_SIZE",
            &mut config.max_atomic_group_size,
            r,
        );
        override_from_env(
            "RC_POOL_PURGE_INTERVAL_SECS",
            &mut config.purge_interval_secs,
            r,
        );
        (config, rejected)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_txs == 0 {
            return Err(ConfigError::Zero("max_txs"));
        }
        if self.safety_period == 0 {
            return Err(ConfigError::Zero("safety_period"));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Zero("max_batch_size"));
        }
        if self.purge_interval_secs == 0 {
            return Err(ConfigError::Zero("purge_interval_secs"));
        }
        if !(2..=255).contains(&self.max_atomic_group_size) {
            return Err(ConfigError::GroupSize(self.max_atomic_group_size));
        }
        Ok(())
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_secs.saturating_mul(1_000)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

fn override_from_env<T: FromStr>(
    key: &'static str,
    slot: &mut T,
    rejected: &mut Vec<ConfigError>,
) {
    if let Ok(raw) = env::var(key) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => rejected.push(ConfigError::Malformed { key, value: raw }),
        }
    }
}
