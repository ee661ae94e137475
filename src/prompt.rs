// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! Prompt kinds and per-record prompt key resolution.
//!
//! A prompt is the auxiliary embedding pair (cell type, regulator) injected
//! into the model for context-specific prediction. Keys come either from the
//! supervised file columns or from the explicit `--prompt-celltype` /
//! `--prompt-regulator` flags; the flag wins when both are present.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ImputationError, Result};
use crate::supervised::SupervisedRecord;

/// Prompt kinds accepted by the released checkpoints.
///
/// Cistrome prompts use `atac:` prefixed cell-type keys (e.g. `atac:k562`),
/// expression prompts use the bare cell type (e.g. `k562`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    /// Cell-type context from chromatin accessibility.
    Cistrome,
    /// Cell-type context from expression profiles.
    Expression,
}

impl PromptKind {
    /// Returns the string representation used on the CLI and in metadata.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cistrome => "cistrome",
            Self::Expression => "expression",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PromptKind {
    type Err = PromptKindParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cistrome" => Ok(Self::Cistrome),
            "expression" => Ok(Self::Expression),
            _ => Err(PromptKindParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid prompt kind string.
#[derive(Debug, Clone)]
pub struct PromptKindParseError(String);

impl fmt::Display for PromptKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid prompt kind '{}', expected one of: cistrome, expression",
            self.0
        )
    }
}

impl std::error::Error for PromptKindParseError {}

/// Resolves the (cell type, regulator) key pair for each supervised record.
///
/// Explicit keys are fixed for the whole run; otherwise each record must
/// carry its own key in the corresponding column.
#[derive(Debug, Clone, Default)]
pub struct PromptResolver {
    /// Run-wide cell-type key from `--prompt-celltype`.
    pub celltype: Option<String>,
    /// Run-wide regulator key from `--prompt-regulator`.
    pub regulator: Option<String>,
}

impl PromptResolver {
    /// Create a resolver from the optional explicit keys.
    #[must_use]
    pub fn new(celltype: Option<String>, regulator: Option<String>) -> Self {
        Self { celltype, regulator }
    }

    /// Resolve the cell-type key for a record.
    ///
    /// # Errors
    ///
    /// Returns an error if neither the flag nor the record supplies a key.
    pub fn celltype_key(&self, record: &SupervisedRecord) -> Result<String> {
        self.celltype
            .clone()
            .or_else(|| record.celltype.clone())
            .ok_or_else(|| {
                ImputationError::PromptError(format!(
                    "no cell-type prompt for {}: pass --prompt-celltype or add a celltype column",
                    record.region()
                ))
            })
    }

    /// Resolve the regulator key for a record.
    ///
    /// # Errors
    ///
    /// Returns an error if neither the flag nor the record supplies a key.
    pub fn regulator_key(&self, record: &SupervisedRecord) -> Result<String> {
        self.regulator
            .clone()
            .or_else(|| record.regulator.clone())
            .ok_or_else(|| {
                ImputationError::PromptError(format!(
                    "no regulator prompt for {}: pass --prompt-regulator or add a regulator column",
                    record.region()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervised::SupervisedRecord;

    fn record(celltype: Option<&str>, regulator: Option<&str>) -> SupervisedRecord {
        SupervisedRecord {
            chrom: "chr1".to_string(),
            start: 10_000,
            end: 11_000,
            build_region_index: None,
            label: None,
            celltype: celltype.map(str::to_string),
            regulator: regulator.map(str::to_string),
        }
    }

    #[test]
    fn test_prompt_kind_from_str() {
        assert_eq!("cistrome".parse::<PromptKind>().unwrap(), PromptKind::Cistrome);
        assert_eq!(
            "Expression".parse::<PromptKind>().unwrap(),
            PromptKind::Expression
        );
        assert!("dna".parse::<PromptKind>().is_err());
    }

    #[test]
    fn test_explicit_key_overrides_column() {
        let resolver = PromptResolver::new(Some("atac:k562".to_string()), None);
        let rec = record(Some("atac:gm12878"), Some("ctcf"));
        assert_eq!(resolver.celltype_key(&rec).unwrap(), "atac:k562");
        assert_eq!(resolver.regulator_key(&rec).unwrap(), "ctcf");
    }

    #[test]
    fn test_column_key_used_without_flag() {
        let resolver = PromptResolver::default();
        let rec = record(Some("atac:k562"), Some("h3k27ac"));
        assert_eq!(resolver.celltype_key(&rec).unwrap(), "atac:k562");
        assert_eq!(resolver.regulator_key(&rec).unwrap(), "h3k27ac");
    }

    #[test]
    fn test_missing_key_is_error() {
        let resolver = PromptResolver::default();
        let rec = record(None, Some("ctcf"));
        let err = resolver.celltype_key(&rec).unwrap_err();
        assert!(err.to_string().contains("--prompt-celltype"));
        assert!(resolver.regulator_key(&rec).is_ok());
    }
}
