// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config port and bus settings.

use std::num::NonZeroUsize;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use weave_core::ParallelStrategy;

/// Key under which [`BusConfig`] is stored.
pub const BUS_CONFIG_KEY: &str = "bus";

/// Where bus settings live between runs.
///
/// Implementations hand back opaque bytes; [`ConfigService`] owns the JSON
/// encoding. A missing key is [`ConfigError::NotFound`].
pub trait ConfigStore {
    /// Bytes stored under `key`.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Replaces the bytes under `key`.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Failure loading, validating or storing bus settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Nothing stored under the key.
    #[error("not found")]
    NotFound,
    /// The store could not be read or written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Stored bytes are not valid settings JSON.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Rejected values or a store-specific failure.
    #[error("other: {0}")]
    Other(String),
}

/// JSON codec in front of a [`ConfigStore`], consumed by [`BusConfig`].
pub struct ConfigService<S> {
    store: S,
}

impl<S: ConfigStore> ConfigService<S> {
    /// Service over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Empty blobs count as missing.
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }
}

/// Conflict strategy of the bus state cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Parallel writes replace the cached state.
    #[default]
    Overwrite,
    /// Parallel writes leave the cached state alone.
    Ignore,
}

impl From<StrategyKind> for ParallelStrategy {
    fn from(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Overwrite => Self::Overwrite,
            StrategyKind::Ignore => Self::Ignore,
        }
    }
}

/// Bus settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Size of the worker pool shared by all ports.
    pub worker_threads: usize,
    /// Strategy the state cache applies to parallel writes.
    pub parallel_strategy: StrategyKind,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            parallel_strategy: StrategyKind::default(),
        }
    }
}

impl BusConfig {
    /// Loads the bus settings, falling back to defaults when none are stored.
    pub fn load<S: ConfigStore>(service: &ConfigService<S>) -> Result<Self, ConfigError> {
        let config: Self = service.load(BUS_CONFIG_KEY)?.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Persists these settings.
    pub fn save<S: ConfigStore>(&self, service: &ConfigService<S>) -> Result<(), ConfigError> {
        self.validate()?;
        service.save(BUS_CONFIG_KEY, self)
    }

    /// Rejects settings the bus cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::Other("worker_threads must be at least 1".into()));
        }
        Ok(())
    }

    /// Strategy for the state cache's applicator.
    pub fn strategy(&self) -> ParallelStrategy {
        self.parallel_strategy.into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: BusConfig = serde_json::from_str(r#"{"parallel_strategy":"ignore"}"#).unwrap();
        assert_eq!(config.parallel_strategy, StrategyKind::Ignore);
        assert!(config.worker_threads >= 1);
    }

    #[test]
    fn zero_workers_are_rejected() {
        let config = BusConfig {
            worker_threads: 0,
            ..BusConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Other(_))));
    }
}
