//! Service configuration: environment variables with an optional YAML
//! override file (`KEYGATE_CONFIG`).
//!
//! Durations are plain millisecond fields so YAML overrides stay flat and
//! ops-friendly; the typed runtime configs are derived on demand.

use crate::realms::aggregate::AggregateConfig;
use crate::realms::index::IndexConfig;
use crate::realms::projector::IndexingConfig;
use anyhow::{Context, Result};
use keygate_realm::RetryStrategy;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct IamConfig {
    /// HTTP bind address for the realms API.
    pub bind_addr: SocketAddr,
    /// Metrics HTTP bind address.
    pub metrics_bind: SocketAddr,
    /// Development mode: every caller is granted everything. Production
    /// deployments turn this off and manage grants through the ACL tree.
    pub acls_open: bool,
    pub aggregate: AggregateSettings,
    pub key_value_store: KeyValueStoreSettings,
    pub indexing: IndexingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregateSettings {
    pub ask_timeout_ms: u64,
    pub command_evaluation_timeout_ms: u64,
    pub shards: usize,
    pub snapshot_every: u64,
    pub passivation: PassivationSettings,
    pub retry: RetrySettings,
}

impl Default for AggregateSettings {
    fn default() -> Self {
        Self {
            ask_timeout_ms: 10_000,
            command_evaluation_timeout_ms: 5_000,
            shards: 64,
            snapshot_every: 100,
            passivation: PassivationSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PassivationSettings {
    pub lapsed_since_last_interaction_ms: u64,
    pub lapsed_since_recovery_completed_ms: u64,
}

impl Default for PassivationSettings {
    fn default() -> Self {
        Self {
            lapsed_since_last_interaction_ms: 300_000,
            lapsed_since_recovery_completed_ms: 1_800_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyValueStoreSettings {
    pub ask_timeout_ms: u64,
    pub consistency_timeout_ms: u64,
    pub retry: RetrySettings,
}

impl Default for KeyValueStoreSettings {
    fn default() -> Self {
        Self {
            ask_timeout_ms: 5_000,
            consistency_timeout_ms: 3_000,
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexingSettings {
    pub batch: usize,
    pub batch_timeout_ms: u64,
    pub retry: RetrySettings,
    pub progress: ProgressSettings,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            batch: 25,
            batch_timeout_ms: 500,
            retry: RetrySettings::default(),
            progress: ProgressSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    pub persist_after_processed: u64,
    pub max_time_window_ms: u64,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            persist_after_processed: 100,
            max_time_window_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// One of `never`, `once`, `constant`, `exponential`.
    pub strategy: String,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            strategy: "exponential".to_string(),
            initial_delay_ms: 100,
            max_delay_ms: 2_000,
            max_retries: 3,
        }
    }
}

impl RetrySettings {
    pub fn to_strategy(&self) -> RetryStrategy {
        let initial = Duration::from_millis(self.initial_delay_ms);
        match self.strategy.as_str() {
            "never" => RetryStrategy::Never,
            "once" => RetryStrategy::Once { delay: initial },
            "constant" => RetryStrategy::Constant {
                delay: initial,
                max_retries: self.max_retries,
            },
            _ => RetryStrategy::exponential(
                initial,
                Duration::from_millis(self.max_delay_ms),
                self.max_retries,
            ),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct IamConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    acls_open: Option<bool>,
    aggregate: Option<AggregateSettings>,
    key_value_store: Option<KeyValueStoreSettings>,
    indexing: Option<IndexingSettings>,
}

impl IamConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("KEYGATE_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .with_context(|| "parse KEYGATE_BIND")?;
        let metrics_bind = std::env::var("KEYGATE_METRICS_BIND")
            .unwrap_or_else(|_| "0.0.0.0:9090".to_string())
            .parse()
            .with_context(|| "parse KEYGATE_METRICS_BIND")?;
        // Open ACLs by default for local development.
        let acls_open = std::env::var("KEYGATE_ACLS_OPEN")
            .map(|value| value != "false")
            .unwrap_or(true);
        Ok(Self {
            bind_addr,
            metrics_bind,
            acls_open,
            aggregate: AggregateSettings::default(),
            key_value_store: KeyValueStoreSettings::default(),
            indexing: IndexingSettings::default(),
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("KEYGATE_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read KEYGATE_CONFIG: {path}"))?;
            let override_cfg: IamConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse iam config yaml")?;
            if let Some(value) = override_cfg.bind_addr {
                config.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
            }
            if let Some(value) = override_cfg.metrics_bind {
                config.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
            }
            if let Some(value) = override_cfg.acls_open {
                config.acls_open = value;
            }
            if let Some(value) = override_cfg.aggregate {
                config.aggregate = value;
            }
            if let Some(value) = override_cfg.key_value_store {
                config.key_value_store = value;
            }
            if let Some(value) = override_cfg.indexing {
                config.indexing = value;
            }
        }
        Ok(config)
    }

    pub fn aggregate_config(&self) -> AggregateConfig {
        AggregateConfig {
            ask_timeout: Duration::from_millis(self.aggregate.ask_timeout_ms),
            command_evaluation_timeout: Duration::from_millis(
                self.aggregate.command_evaluation_timeout_ms,
            ),
            shards: self.aggregate.shards,
            snapshot_every: self.aggregate.snapshot_every,
            passivate_after_interaction: Duration::from_millis(
                self.aggregate.passivation.lapsed_since_last_interaction_ms,
            ),
            passivate_after_recovery: Duration::from_millis(
                self.aggregate.passivation.lapsed_since_recovery_completed_ms,
            ),
            retry: self.aggregate.retry.to_strategy(),
        }
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            ask_timeout: Duration::from_millis(self.key_value_store.ask_timeout_ms),
            consistency_timeout: Duration::from_millis(self.key_value_store.consistency_timeout_ms),
            retry: self.key_value_store.retry.to_strategy(),
        }
    }

    pub fn indexing_config(&self) -> IndexingConfig {
        IndexingConfig {
            batch: self.indexing.batch,
            batch_timeout: Duration::from_millis(self.indexing.batch_timeout_ms),
            retry: self.indexing.retry.to_strategy(),
            persist_after_processed: self.indexing.progress.persist_after_processed,
            progress_max_time_window: Duration::from_millis(
                self.indexing.progress.max_time_window_ms,
            ),
        }
    }
}
