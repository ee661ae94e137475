// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! Run configuration.
//!
//! [`ImputationConfig`] collects everything a run needs beyond the three
//! required CLI inputs: prompt handling, dataloader parallelism, and the
//! genome/resolution pair that selects the checkpoint artifacts. It uses a
//! builder pattern for construction and round-trips through JSON so that a
//! resolved configuration can be stamped into the output file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ImputationError, Result};
use crate::genome::{BinSize, Genome};
use crate::prompt::PromptKind;

/// Default inference batch size.
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Default data-loading parallelism.
pub const DEFAULT_NUM_WORKERS: usize = 8;

/// Default external prompt embedding dimension (scGPT caches; ChromBERT
/// caches use 768).
pub const DEFAULT_PROMPT_DIM_EXTERNAL: usize = 512;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_num_workers() -> usize {
    DEFAULT_NUM_WORKERS
}
fn default_prompt_dim_external() -> usize {
    DEFAULT_PROMPT_DIM_EXTERNAL
}

/// Configuration for an imputation run.
///
/// # Example
///
/// ```rust
/// use chrombert_imputation::{ImputationConfig, PromptKind};
///
/// let config = ImputationConfig::new(PromptKind::Cistrome)
///     .with_batch_size(16)
///     .with_num_workers(4)
///     .with_prompt_celltype(Some("atac:k562".to_string()));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImputationConfig {
    /// Kind of prompt the checkpoint was trained with.
    pub prompt_kind: PromptKind,
    /// Genome build; only `hg38` checkpoints exist.
    #[serde(default)]
    pub genome: Genome,
    /// Use 200 bp bins instead of 1 kb. Rejected by `validate` until the
    /// high-resolution checkpoints are released.
    #[serde(default)]
    pub high_resolution: bool,
    /// Dimension of the external prompt embeddings in the cache files.
    #[serde(default = "default_prompt_dim_external")]
    pub prompt_dim_external: usize,
    /// Run-wide cell-type key, overriding the supervised file column.
    #[serde(default)]
    pub prompt_celltype: Option<String>,
    /// Run-wide regulator key, overriding the supervised file column.
    #[serde(default)]
    pub prompt_regulator: Option<String>,
    /// Cell-type prompt cache file.
    #[serde(default)]
    pub prompt_celltype_cache_file: Option<PathBuf>,
    /// Regulator prompt cache file.
    #[serde(default)]
    pub prompt_regulator_cache_file: Option<PathBuf>,
    /// Read the whole regulator cache into memory at open.
    #[serde(default)]
    pub prompt_regulator_cache_pin_memory: bool,
    /// Cap on in-memory regulator cache entries; unset means unbounded.
    #[serde(default)]
    pub prompt_regulator_cache_limit: Option<usize>,
    /// Inference batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of data-loading worker threads; 0 loads inline.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
}

impl ImputationConfig {
    /// Create a configuration with defaults for the given prompt kind.
    #[must_use]
    pub fn new(prompt_kind: PromptKind) -> Self {
        Self {
            prompt_kind,
            genome: Genome::default(),
            high_resolution: false,
            prompt_dim_external: DEFAULT_PROMPT_DIM_EXTERNAL,
            prompt_celltype: None,
            prompt_regulator: None,
            prompt_celltype_cache_file: None,
            prompt_regulator_cache_file: None,
            prompt_regulator_cache_pin_memory: false,
            prompt_regulator_cache_limit: None,
            batch_size: DEFAULT_BATCH_SIZE,
            num_workers: DEFAULT_NUM_WORKERS,
        }
    }

    /// Set the genome build.
    #[must_use]
    pub const fn with_genome(mut self, genome: Genome) -> Self {
        self.genome = genome;
        self
    }

    /// Enable or disable 200 bp bins.
    #[must_use]
    pub const fn with_high_resolution(mut self, high_resolution: bool) -> Self {
        self.high_resolution = high_resolution;
        self
    }

    /// Set the external prompt embedding dimension.
    #[must_use]
    pub const fn with_prompt_dim_external(mut self, dim: usize) -> Self {
        self.prompt_dim_external = dim;
        self
    }

    /// Set the run-wide cell-type key.
    #[must_use]
    pub fn with_prompt_celltype(mut self, celltype: Option<String>) -> Self {
        self.prompt_celltype = celltype;
        self
    }

    /// Set the run-wide regulator key.
    #[must_use]
    pub fn with_prompt_regulator(mut self, regulator: Option<String>) -> Self {
        self.prompt_regulator = regulator;
        self
    }

    /// Set the cell-type prompt cache file.
    #[must_use]
    pub fn with_prompt_celltype_cache_file(mut self, path: Option<PathBuf>) -> Self {
        self.prompt_celltype_cache_file = path;
        self
    }

    /// Set the regulator prompt cache file.
    #[must_use]
    pub fn with_prompt_regulator_cache_file(mut self, path: Option<PathBuf>) -> Self {
        self.prompt_regulator_cache_file = path;
        self
    }

    /// Pin the regulator cache in memory.
    #[must_use]
    pub const fn with_prompt_regulator_cache_pin_memory(mut self, pin: bool) -> Self {
        self.prompt_regulator_cache_pin_memory = pin;
        self
    }

    /// Cap the in-memory regulator cache entries.
    #[must_use]
    pub const fn with_prompt_regulator_cache_limit(mut self, limit: Option<usize>) -> Self {
        self.prompt_regulator_cache_limit = limit;
        self
    }

    /// Set the inference batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of data-loading workers.
    #[must_use]
    pub const fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Bin size selected by the resolution flag.
    #[must_use]
    pub const fn bin_size(&self) -> BinSize {
        if self.high_resolution {
            BinSize::Bp200
        } else {
            BinSize::Kb1
        }
    }

    /// Check the configuration for values no run can proceed with.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for a zero batch size, a zero prompt
    /// dimension, a zero cache limit, or the unreleased 200 bp resolution.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ImputationError::ConfigError(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.prompt_dim_external == 0 {
            return Err(ImputationError::ConfigError(
                "prompt dimension must be at least 1".to_string(),
            ));
        }
        if self.prompt_regulator_cache_limit == Some(0) {
            return Err(ImputationError::ConfigError(
                "prompt regulator cache limit must be at least 1 when set".to_string(),
            ));
        }
        if self.high_resolution {
            return Err(ImputationError::ConfigError(
                "200bp bins are not yet available, rerun without --high-resolution".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a configuration from a JSON file.
    ///
    /// Unknown fields are rejected, mirroring the strictness of the original
    /// preset loader.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or parsed.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ImputationError::ConfigError(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            ImputationError::ConfigError(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Write the configuration to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if serialization or the write fails.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = self.to_json()?;
        std::fs::write(path, text).map_err(|e| {
            ImputationError::ConfigError(format!("failed to write {}: {e}", path.display()))
        })
    }

    /// Serialize the configuration to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ImputationError::ConfigError(format!("failed to serialize config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ImputationConfig::new(PromptKind::Cistrome);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.prompt_dim_external, 512);
        assert_eq!(config.genome, Genome::Hg38);
        assert_eq!(config.bin_size(), BinSize::Kb1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ImputationConfig::new(PromptKind::Expression)
            .with_batch_size(32)
            .with_num_workers(2)
            .with_prompt_dim_external(768)
            .with_prompt_regulator(Some("ctcf".to_string()))
            .with_prompt_regulator_cache_limit(Some(16));
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.prompt_dim_external, 768);
        assert_eq!(config.prompt_regulator.as_deref(), Some("ctcf"));
        assert_eq!(config.prompt_regulator_cache_limit, Some(16));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = ImputationConfig::new(PromptKind::Cistrome).with_batch_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_high_resolution() {
        let config = ImputationConfig::new(PromptKind::Cistrome).with_high_resolution(true);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not yet available"));
    }

    #[test]
    fn test_validate_rejects_zero_cache_limit() {
        let config = ImputationConfig::new(PromptKind::Cistrome)
            .with_prompt_regulator_cache_limit(Some(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = ImputationConfig::new(PromptKind::Cistrome)
            .with_batch_size(4)
            .with_prompt_celltype(Some("atac:k562".to_string()));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        config.to_json_file(&path).unwrap();
        let loaded = ImputationConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded.batch_size, 4);
        assert_eq!(loaded.prompt_kind, PromptKind::Cistrome);
        assert_eq!(loaded.prompt_celltype.as_deref(), Some("atac:k562"));
    }

    #[test]
    fn test_json_rejects_unknown_fields() {
        let json = r#"{"prompt_kind": "cistrome", "perturbation": true}"#;
        let parsed: std::result::Result<ImputationConfig, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_json_requires_prompt_kind() {
        let parsed: std::result::Result<ImputationConfig, _> = serde_json::from_str("{}");
        assert!(parsed.is_err());
    }
}
