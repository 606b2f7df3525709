use crate::core::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Command-processing knobs of a partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Upper bound of commands handled per processing batch.
    pub max_commands_in_batch: usize,
    /// Log positions of commands that must never be processed.
    pub skip_positions: BTreeSet<i64>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_commands_in_batch: 100,
            skip_positions: BTreeSet::new(),
        }
    }
}

/// Retry behaviour of pending command distributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Interval in milliseconds between redistribution sweeps.
    pub redistribution_interval_ms: u64,
    /// Maximum backoff in milliseconds between two retries of one distribution.
    pub max_backoff_ms: u64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            redistribution_interval_ms: 10_000,
            max_backoff_ms: 300_000,
        }
    }
}

impl DistributionConfig {
    pub fn redistribution_interval(&self) -> Duration {
        Duration::from_millis(self.redistribution_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfiguredUser {
    pub username: String,
    pub password: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfiguredMapping {
    pub claim_name: String,
    pub claim_value: String,
}

/// Identity content created by the bootstrap task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitializationConfig {
    pub users: Vec<ConfiguredUser>,
    pub mappings: Vec<ConfiguredMapping>,
}

impl Default for InitializationConfig {
    fn default() -> Self {
        Self {
            users: vec![ConfiguredUser {
                username: "demo".to_string(),
                password: "demo".to_string(),
                name: "Demo".to_string(),
                email: "demo@demo.com".to_string(),
            }],
            mappings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// When false every command passes the permission check.
    pub authorizations_enabled: bool,
    /// When false tenant visibility is not enforced.
    pub multi_tenancy_enabled: bool,
    /// bcrypt cost used for stored passwords.
    pub password_hash_cost: u32,
    pub initialization: InitializationConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            authorizations_enabled: true,
            multi_tenancy_enabled: false,
            password_hash_cost: bcrypt::DEFAULT_COST,
            initialization: InitializationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub enable_identity_setup: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_identity_setup: true,
        }
    }
}

/// Scheduling of the out-of-band archiver jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    /// Nominal delay between two runs of the same job.
    pub delay_between_runs_ms: u64,
    /// Cap of the error backoff.
    pub max_delay_between_runs_ms: u64,
    /// Number of documents moved per run.
    pub rollover_batch_size: usize,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            delay_between_runs_ms: 2_000,
            max_delay_between_runs_ms: 10_000,
            rollover_batch_size: 100,
        }
    }
}

/// Top level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub processing: ProcessingConfig,
    pub distribution: DistributionConfig,
    pub security: SecurityConfig,
    pub feature_flags: FeatureFlags,
    pub archiver: ArchiverConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON configuration file; missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            EngineError::ConfigError(format!("cannot read '{}': {}", path.display(), err))
        })?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_commands_in_batch(mut self, max_commands: usize) -> Self {
        self.processing.max_commands_in_batch = max_commands;
        self
    }

    pub fn with_skip_positions(mut self, positions: impl IntoIterator<Item = i64>) -> Self {
        self.processing.skip_positions = positions.into_iter().collect();
        self
    }

    pub fn with_authorizations_enabled(mut self, enabled: bool) -> Self {
        self.security.authorizations_enabled = enabled;
        self
    }

    pub fn with_multi_tenancy_enabled(mut self, enabled: bool) -> Self {
        self.security.multi_tenancy_enabled = enabled;
        self
    }

    pub fn with_identity_setup(mut self, enabled: bool) -> Self {
        self.feature_flags.enable_identity_setup = enabled;
        self
    }

    pub fn with_password_hash_cost(mut self, cost: u32) -> Self {
        self.security.password_hash_cost = cost;
        self
    }

    pub fn with_initial_users(mut self, users: Vec<ConfiguredUser>) -> Self {
        self.security.initialization.users = users;
        self
    }

    pub fn with_redistribution(mut self, interval_ms: u64, max_backoff_ms: u64) -> Self {
        self.distribution.redistribution_interval_ms = interval_ms;
        self.distribution.max_backoff_ms = max_backoff_ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.processing.max_commands_in_batch < 1 {
            return Err(EngineError::ConfigError(format!(
                "processing.max_commands_in_batch must be >= 1 but was {}",
                self.processing.max_commands_in_batch
            )));
        }
        if self.distribution.redistribution_interval_ms == 0 {
            return Err(EngineError::ConfigError(
                "distribution.redistribution_interval_ms must be > 0".to_string(),
            ));
        }
        if self.distribution.max_backoff_ms < self.distribution.redistribution_interval_ms {
            return Err(EngineError::ConfigError(format!(
                "distribution.max_backoff_ms ({}) must not be lower than the redistribution interval ({})",
                self.distribution.max_backoff_ms, self.distribution.redistribution_interval_ms
            )));
        }
        if !(4..=31).contains(&self.security.password_hash_cost) {
            return Err(EngineError::ConfigError(format!(
                "security.password_hash_cost must be within 4..=31 but was {}",
                self.security.password_hash_cost
            )));
        }
        if self.archiver.delay_between_runs_ms > self.archiver.max_delay_between_runs_ms {
            return Err(EngineError::ConfigError(format!(
                "archiver.delay_between_runs_ms ({}) must not exceed archiver.max_delay_between_runs_ms ({})",
                self.archiver.delay_between_runs_ms, self.archiver.max_delay_between_runs_ms
            )));
        }
        if self
            .security
            .initialization
            .users
            .iter()
            .any(|user| user.username.trim().is_empty())
        {
            return Err(EngineError::ConfigError(
                "security.initialization.users must not contain empty usernames".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.processing.max_commands_in_batch, 100);
        assert!(config.feature_flags.enable_identity_setup);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_empty_batches() {
        let err = EngineConfig::default()
            .with_max_commands_in_batch(0)
            .validate()
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("max_commands_in_batch must be >= 1 but was 0"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"processing":{"skip_positions":[3,5]}}"#).unwrap();
        assert_eq!(config.processing.max_commands_in_batch, 100);
        assert!(config.processing.skip_positions.contains(&5));
        assert!(config.security.authorizations_enabled);
    }
}
