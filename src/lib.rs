// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

#![allow(clippy::multiple_crate_versions)]

//! # ChromBERT Cistrome Imputation
//!
//! Single-cell cistrome imputation over pre-trained
//! [ChromBERT](https://github.com/TongjiZhanglab/ChromBERT) checkpoints,
//! written in Rust. Given a supervised table of genomic regions and a
//! (cell type, regulator) prompt pair per row, the tool loads an exported
//! checkpoint, batches the regions through ONNX Runtime, and writes imputed
//! binding probabilities to an HDF5 file.
//!
//! ## Features
//!
//! - **Opaque model runtime** - checkpoints are ONNX exports; a fine-tuned
//!   graph supersedes the pretrained one when given
//! - **Prompt caches** - precomputed cell-type/regulator embeddings from
//!   HDF5 cache files, pinned in memory or LRU-limited
//! - **Parallel loading** - `--num-workers` threads read token rows and
//!   resolve prompts while inference runs, preserving input order
//! - **Artifact resolution** - released checkpoints and datasets resolve
//!   against a basedir and download on first use
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use chrombert_imputation::{ChromBert, SupervisedFile};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let supervised = SupervisedFile::open("regions.tsv")?;
//!     let model = ChromBert::load("hg38_6k_1kb_pretrain.onnx", None)?;
//!     println!(
//!         "{} records, {} tokens per region",
//!         supervised.len(),
//!         model.seq_len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Impute with keys taken from the supervised file columns
//! chrombert_imputation_cistrome_sc regions.tsv --o-h5 out.hdf5 --prompt-kind cistrome
//!
//! # Fixed keys for the whole run
//! chrombert_imputation_cistrome_sc regions.tsv --o-h5 out.hdf5 --prompt-kind expression \
//!     --prompt-celltype k562 --prompt-regulator ctcf
//!
//! # Large-scale prediction with prompt caches
//! chrombert_imputation_cistrome_sc cells.tsv --o-h5 out.hdf5 --prompt-kind cistrome \
//!     --prompt-celltype-cache-file celltype_cache.hdf5 \
//!     --prompt-regulator-cache-file regulator_cache.hdf5 \
//!     --prompt-regulator-cache-pin-memory --batch-size 64 --num-workers 16
//! ```
//!
//! **CLI Options:**
//!
//! | Option | Description | Default |
//! |--------|-------------|---------|
//! | `supervised_file` | Input table of regions | required |
//! | `--o-h5` | Output HDF5 path | required |
//! | `--prompt-kind` | `cistrome` or `expression` | required |
//! | `--basedir` | Base dir for artifact resolution | `~/.cache/chrombert/data` |
//! | `-g, --genome` | Genome build (only `hg38`) | `hg38` |
//! | `--pretrain-ckpt` | Pretrained checkpoint | inferred |
//! | `-d, --hdf5-file` | Backing dataset HDF5 | inferred |
//! | `--high-resolution` | 200bp bins (not yet available) | off |
//! | `--finetune-ckpt` | Fine-tuned checkpoint | none |
//! | `--prompt-dim-external` | External embedding dimension | `512` |
//! | `--prompt-celltype-cache-file` | Cached cell-type prompts | none |
//! | `--prompt-regulator-cache-file` | Cached regulator prompts | none |
//! | `--prompt-regulator-cache-pin-memory` | Pin regulator cache | off |
//! | `--prompt-regulator-cache-limit` | Cap in-memory cache entries | unset |
//! | `--prompt-celltype` | Explicit cell-type key | none |
//! | `--prompt-regulator` | Explicit regulator key | none |
//! | `--batch-size` | Inference batch size | `8` |
//! | `--num-workers` | Data-loading parallelism | `8` |
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`model`] | [`ChromBert`] checkpoint loading and batched inference |
//! | [`supervised`] | Supervised input table parsing |
//! | [`dataset`] | Backing reference-cistrome HDF5 and region index |
//! | [`cache`] | Prompt embedding caches ([`PromptCache`], [`PromptStore`]) |
//! | [`prompt`] | [`PromptKind`] and per-record key resolution |
//! | [`loader`] | Parallel, order-preserving sample loading |
//! | [`batch`] | [`BatchProcessor`] buffering and fallback |
//! | [`output`] | [`PredictionWriter`] for the result HDF5 |
//! | [`config`] | [`ImputationConfig`] builder and JSON round-trip |
//! | [`download`] | Basedir resolution and artifact downloads |
//! | [`metadata`] | Checkpoint metadata parsing |
//! | [`genome`] | Genome builds and bin resolutions |
//! | [`error`] | Error types ([`ImputationError`], [`Result`]) |

// Modules
pub mod batch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod download;
pub mod error;
pub mod genome;
pub mod loader;
pub mod metadata;
pub mod model;
pub mod output;
pub mod prompt;
pub mod supervised;

// Re-export main types for convenience
pub use batch::BatchProcessor;
pub use cache::{CacheStats, PromptCache, PromptStore};
pub use config::ImputationConfig;
pub use dataset::Dataset;
pub use error::{ImputationError, Result};
pub use genome::{BinSize, Genome};
pub use loader::{Sample, SampleLoader};
pub use metadata::ModelMetadata;
pub use model::ChromBert;
pub use output::PredictionWriter;
pub use prompt::{PromptKind, PromptResolver};
pub use supervised::{SupervisedFile, SupervisedRecord};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        // Version should be semver format like "0.1.2"
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "chrombert-imputation");
    }
}
