// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! Genome builds and bin resolutions supported by the released checkpoints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reference genome builds.
///
/// Only `hg38` checkpoints have been released; the enum exists so that the
/// CLI surface and the checkpoint metadata share one parse path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Genome {
    /// Human GRCh38.
    #[default]
    Hg38,
}

impl Genome {
    /// Returns the string representation used in artifact names and metadata.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hg38 => "hg38",
        }
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Genome {
    type Err = GenomeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hg38" | "grch38" => Ok(Self::Hg38),
            _ => Err(GenomeParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unsupported genome build.
#[derive(Debug, Clone)]
pub struct GenomeParseError(String);

impl fmt::Display for GenomeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported genome '{}', only hg38 is supported", self.0)
    }
}

impl std::error::Error for GenomeParseError {}

/// Genomic bin resolution of a checkpoint and its backing dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BinSize {
    /// 1 kb bins, the released resolution.
    #[default]
    #[serde(rename = "1kb")]
    Kb1,
    /// 200 bp bins (`--high-resolution`); named here but not yet available.
    #[serde(rename = "200bp")]
    Bp200,
}

impl BinSize {
    /// Bin width in base pairs.
    #[must_use]
    pub const fn bp(&self) -> u64 {
        match self {
            Self::Kb1 => 1000,
            Self::Bp200 => 200,
        }
    }

    /// Returns the string representation used in artifact names and metadata.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kb1 => "1kb",
            Self::Bp200 => "200bp",
        }
    }
}

impl fmt::Display for BinSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BinSize {
    type Err = BinSizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1kb" | "1000" | "1000bp" => Ok(Self::Kb1),
            "200bp" | "200" => Ok(Self::Bp200),
            _ => Err(BinSizeParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid bin size string.
#[derive(Debug, Clone)]
pub struct BinSizeParseError(String);

impl fmt::Display for BinSizeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid bin size '{}', expected one of: 1kb, 200bp", self.0)
    }
}

impl std::error::Error for BinSizeParseError {}
