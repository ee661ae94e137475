// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! Checkpoint metadata parsing.
//!
//! Exported ChromBERT checkpoints embed their provenance in the ONNX custom
//! metadata properties: genome build, bin size, sequence length (number of
//! regulator tokens per region), hidden size and the expected prompt
//! dimension. The values are stored either under individual keys or as one
//! combined `key: value` blob.

use std::collections::HashMap;

use crate::error::{ImputationError, Result};
use crate::genome::{BinSize, Genome};

/// Number of regulator tokens per region in the released checkpoints.
pub const DEFAULT_SEQ_LEN: usize = 6391;

/// Hidden size of the released checkpoints.
pub const DEFAULT_HIDDEN_SIZE: usize = 768;

/// Prompt dimension of the released checkpoints (scGPT-derived caches).
pub const DEFAULT_PROMPT_DIM: usize = 512;

/// Metadata extracted from a ChromBERT ONNX checkpoint.
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    /// Checkpoint description (e.g. "ChromBERT hg38 1kb imputation export").
    pub description: String,
    /// Exporter version.
    pub version: String,
    /// Genome build the checkpoint was trained on.
    pub genome: Genome,
    /// Bin resolution the checkpoint was trained on.
    pub bin_size: BinSize,
    /// Regulator tokens per region.
    pub seq_len: usize,
    /// Transformer hidden size.
    pub hidden_size: usize,
    /// External prompt embedding dimension the graph expects.
    pub prompt_dim: usize,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            version: String::new(),
            genome: Genome::Hg38,
            bin_size: BinSize::Kb1,
            seq_len: DEFAULT_SEQ_LEN,
            hidden_size: DEFAULT_HIDDEN_SIZE,
            prompt_dim: DEFAULT_PROMPT_DIM,
        }
    }
}

impl ModelMetadata {
    /// Parse metadata from ONNX custom metadata properties.
    ///
    /// Missing keys keep their defaults; a checkpoint without any custom
    /// metadata parses to the released-checkpoint defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a present key carries an unparseable value.
    pub fn from_onnx_metadata(metadata_map: &HashMap<String, String>) -> Result<Self> {
        // A combined blob under "metadata" is split into individual keys first.
        if let Some(blob) = metadata_map.get("metadata") {
            return Self::from_kv_str(blob);
        }

        let mut metadata = Self::default();
        for (key, value) in metadata_map {
            metadata.apply(key, value)?;
        }
        Ok(metadata)
    }

    /// Parse metadata from a combined `key: value` per-line blob.
    ///
    /// # Errors
    ///
    /// Returns an error if a line carries an unparseable value.
    pub fn from_kv_str(blob: &str) -> Result<Self> {
        let mut metadata = Self::default();
        for line in blob.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                let value = value.trim().trim_matches('\'').trim_matches('"');
                metadata.apply(key.trim(), value)?;
            }
        }
        Ok(metadata)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "description" => self.description = value.to_string(),
            "version" => self.version = value.to_string(),
            "genome" => {
                self.genome = value.parse().map_err(|e| {
                    ImputationError::ModelLoadError(format!("Invalid genome in metadata: {e}"))
                })?;
            }
            "bin_size" => {
                self.bin_size = value.parse().map_err(|e| {
                    ImputationError::ModelLoadError(format!("Invalid bin size in metadata: {e}"))
                })?;
            }
            "seq_len" => self.seq_len = Self::parse_usize("seq_len", value)?,
            "hidden_size" => self.hidden_size = Self::parse_usize("hidden_size", value)?,
            "prompt_dim" => self.prompt_dim = Self::parse_usize("prompt_dim", value)?,
            _ => {}
        }
        Ok(())
    }

    fn parse_usize(key: &str, value: &str) -> Result<usize> {
        value.parse().map_err(|_| {
            ImputationError::ModelLoadError(format!("Invalid {key} value: {value}"))
        })
    }

    /// Short display name derived from the description, for log lines.
    #[must_use]
    pub fn model_name(&self) -> &str {
        if self.description.is_empty() {
            "ChromBERT"
        } else {
            &self.description
        }
    }
}
