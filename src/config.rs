use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Engine configuration, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Parallel report parses per batch.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub diff_cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaselineConfig {
    /// How many historical builds to walk backward looking for a reference.
    #[serde(default = "default_lookback")]
    pub max_lookback: usize,
    /// Upper bound on one reference lookup before the diff degrades to
    /// "no baseline".
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Retained (old ref, new ref) delta entries.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_workers() -> usize {
    4
}

fn default_lookback() -> usize {
    25
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_capacity() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            workers: default_workers(),
            baseline: BaselineConfig::default(),
            diff_cache: CacheConfig::default(),
        }
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        BaselineConfig {
            max_lookback: default_lookback(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { capacity: default_capacity() }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: EngineConfig =
            toml::from_str(&content).with_context(|| "Failed to parse engine config")?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        if self.diff_cache.capacity == 0 {
            anyhow::bail!("diff_cache.capacity must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
workers = 8

[baseline]
max_lookback = 10
timeout_ms = 1500

[diff_cache]
capacity = 32
"#;

        let config: EngineConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.baseline.max_lookback, 10);
        assert_eq!(config.baseline.timeout_ms, 1500);
        assert_eq!(config.diff_cache.capacity, 32);
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.baseline.max_lookback, 25);
        assert_eq!(config.diff_cache.capacity, 64);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config: EngineConfig = toml::from_str("workers = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("covtree.toml");
        fs::write(&path, "workers = 2").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.workers, 2);
    }
}
