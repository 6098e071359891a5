//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Tunables for the cache, the element pool and the L2ME collector.
///
/// Every field has a default, so a partial JSON file is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Total cache slots; the per-parameter ranges must fit inside.
    pub cache_capacity: usize,
    /// Blocks per pool size class: `[4-byte, 8-byte, 256-byte]`.
    pub pool_blocks: [usize; 3],
    /// Largest response one node may contribute to a concatenated reply.
    pub max_words_per_node: usize,
    /// Largest concatenated reply across all nodes.
    pub max_concat_words: usize,
    /// Minimum spacing between two L2ME transactions.
    pub min_tx_spacing_ms: u64,
    /// Persistent transaction failures tolerated per fill cycle.
    pub failure_budget: u32,
    /// Panic instead of continuing after a fatal structural report.
    pub abort_on_fatal: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_capacity: 4096,
            pool_blocks: [8192, 256, 2048],
            max_words_per_node: 128,
            max_concat_words: 1024,
            min_tx_spacing_ms: 10,
            failure_budget: 3,
            abort_on_fatal: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Reject settings the collector cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_words_per_node < crate::model::PROFILE_WORDS {
            return Err(Error::Config(format!(
                "max_words_per_node ({}) cannot hold one profile ({} words)",
                self.max_words_per_node,
                crate::model::PROFILE_WORDS
            )));
        }
        if self.max_concat_words < self.max_words_per_node {
            return Err(Error::Config(format!(
                "max_concat_words ({}) is below max_words_per_node ({})",
                self.max_concat_words, self.max_words_per_node
            )));
        }
        if self.pool_blocks.iter().any(|n| *n == 0 || *n > u32::MAX as usize) {
            return Err(Error::Config("every pool size class needs 1..=u32::MAX blocks".into()));
        }
        Ok(())
    }

    /// Spacing as a `Duration`.
    pub fn min_tx_spacing(&self) -> Duration {
        Duration::from_millis(self.min_tx_spacing_ms)
    }

    /// Same configuration with no pacing between transactions.
    pub fn unpaced(mut self) -> Self {
        self.min_tx_spacing_ms = 0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"failure_budget": 5}"#).unwrap();
        assert_eq!(config.failure_budget, 5);
        assert_eq!(config.cache_capacity, Config::default().cache_capacity);
    }

    #[test]
    fn test_rejects_tiny_node_budget() {
        let config = Config { max_words_per_node: 8, ..Config::default() };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("moca-cache-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        let config = Config { min_tx_spacing_ms: 25, ..Config::default() };
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
        std::fs::remove_dir_all(&dir).ok();
    }
}
