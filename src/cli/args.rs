// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

use std::path::PathBuf;

use clap::Parser;

use crate::config::{
    ImputationConfig, DEFAULT_BATCH_SIZE, DEFAULT_NUM_WORKERS, DEFAULT_PROMPT_DIM_EXTERNAL,
};
use crate::genome::Genome;
use crate::prompt::PromptKind;

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(name = "chrombert_imputation_cistrome_sc")]
#[command(author, version, about = "Impute single-cell cistromes with a pre-trained ChromBERT checkpoint", long_about = None)]
#[command(after_help = r#"Paths:
    Relative checkpoint, dataset and cache paths resolve against --basedir
    (default ~/.cache/chrombert/data). Inferred artifacts are downloaded
    there when absent.

Examples:
    chrombert_imputation_cistrome_sc regions.tsv --o-h5 out.hdf5 --prompt-kind cistrome
    chrombert_imputation_cistrome_sc regions.tsv --o-h5 out.hdf5 --prompt-kind expression \
        --prompt-celltype k562 --prompt-regulator ctcf
    chrombert_imputation_cistrome_sc cells.tsv --o-h5 out.hdf5 --prompt-kind cistrome \
        --prompt-celltype-cache-file celltype_cache.hdf5 \
        --prompt-regulator-cache-file regulator_cache.hdf5 \
        --prompt-regulator-cache-pin-memory --batch-size 64 --num-workers 16"#)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Path to the supervised input table (TSV/CSV of regions, optionally
    /// with celltype and regulator columns)
    pub supervised_file: PathBuf,

    /// Output HDF5 path
    #[arg(long = "o-h5", value_name = "FILE")]
    pub o_h5: PathBuf,

    /// Prompt kind: cistrome or expression
    #[arg(long, value_name = "KIND")]
    pub prompt_kind: PromptKind,

    /// Base directory for resolving checkpoint, dataset and cache paths
    /// [default: ~/.cache/chrombert/data]
    #[arg(long, value_name = "DIR")]
    pub basedir: Option<PathBuf>,

    /// Genome build; only hg38 is supported
    #[arg(short, long, default_value = "hg38")]
    pub genome: Genome,

    /// Pretrained checkpoint path [default: inferred from genome and resolution]
    #[arg(long, value_name = "FILE")]
    pub pretrain_ckpt: Option<PathBuf>,

    /// Backing dataset HDF5 [default: inferred from genome and resolution]
    #[arg(short = 'd', long = "hdf5-file", value_name = "FILE")]
    pub hdf5_file: Option<PathBuf>,

    /// Use 200bp bins instead of 1kb (not yet available)
    #[arg(long, visible_alias = "hr", default_value_t = false)]
    pub high_resolution: bool,

    /// Fine-tuned checkpoint path; supersedes the pretrained graph
    #[arg(long, value_name = "FILE")]
    pub finetune_ckpt: Option<PathBuf>,

    /// External embedding dimension (512 for scGPT, 768 for ChromBERT)
    #[arg(long, default_value_t = DEFAULT_PROMPT_DIM_EXTERNAL)]
    pub prompt_dim_external: usize,

    /// Path to cached cell-type prompts
    #[arg(long, value_name = "FILE")]
    pub prompt_celltype_cache_file: Option<PathBuf>,

    /// Path to cached regulator prompts
    #[arg(long, value_name = "FILE")]
    pub prompt_regulator_cache_file: Option<PathBuf>,

    /// Pin the regulator prompt cache in memory
    #[arg(long, default_value_t = false)]
    pub prompt_regulator_cache_pin_memory: bool,

    /// Cap on in-memory regulator cache entries
    #[arg(long, value_name = "N")]
    pub prompt_regulator_cache_limit: Option<usize>,

    /// Explicit cell-type key if not in the input file
    #[arg(long, value_name = "KEY")]
    pub prompt_celltype: Option<String>,

    /// Explicit regulator key if not in the input file
    #[arg(long, value_name = "KEY")]
    pub prompt_regulator: Option<String>,

    /// Inference batch size
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Data-loading parallelism; 0 loads inline
    #[arg(long, default_value_t = DEFAULT_NUM_WORKERS)]
    pub num_workers: usize,

    /// Show verbose output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

impl Cli {
    /// Build the run configuration from the parsed arguments.
    #[must_use]
    pub fn to_config(&self) -> ImputationConfig {
        ImputationConfig::new(self.prompt_kind)
            .with_genome(self.genome)
            .with_high_resolution(self.high_resolution)
            .with_prompt_dim_external(self.prompt_dim_external)
            .with_prompt_celltype(self.prompt_celltype.clone())
            .with_prompt_regulator(self.prompt_regulator.clone())
            .with_prompt_celltype_cache_file(self.prompt_celltype_cache_file.clone())
            .with_prompt_regulator_cache_file(self.prompt_regulator_cache_file.clone())
            .with_prompt_regulator_cache_pin_memory(self.prompt_regulator_cache_pin_memory)
            .with_prompt_regulator_cache_limit(self.prompt_regulator_cache_limit)
            .with_batch_size(self.batch_size)
            .with_num_workers(self.num_workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_required_args() {
        // every invocation needs the positional file, --o-h5 and --prompt-kind
        assert!(Cli::try_parse_from(["app"]).is_err());
        assert!(Cli::try_parse_from(["app", "regions.tsv"]).is_err());
        assert!(Cli::try_parse_from(["app", "regions.tsv", "--o-h5", "out.hdf5"]).is_err());
        assert!(
            Cli::try_parse_from(["app", "regions.tsv", "--prompt-kind", "cistrome"]).is_err()
        );
        assert!(Cli::try_parse_from([
            "app",
            "regions.tsv",
            "--o-h5",
            "out.hdf5",
            "--prompt-kind",
            "cistrome"
        ])
        .is_ok());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from([
            "app",
            "regions.tsv",
            "--o-h5",
            "out.hdf5",
            "--prompt-kind",
            "expression",
        ])
        .unwrap();
        assert_eq!(cli.batch_size, 8);
        assert_eq!(cli.num_workers, 8);
        assert_eq!(cli.prompt_dim_external, 512);
        assert_eq!(cli.genome, Genome::Hg38);
        assert!(!cli.high_resolution);
        assert!(!cli.prompt_regulator_cache_pin_memory);
        assert!(cli.prompt_regulator_cache_limit.is_none());
        assert!(cli.verbose);
    }

    #[test]
    fn test_prompt_kind_values() {
        for (value, expected) in [
            ("cistrome", PromptKind::Cistrome),
            ("expression", PromptKind::Expression),
        ] {
            let cli = Cli::try_parse_from([
                "app",
                "regions.tsv",
                "--o-h5",
                "out.hdf5",
                "--prompt-kind",
                value,
            ])
            .unwrap();
            assert_eq!(cli.prompt_kind, expected);
        }
        assert!(Cli::try_parse_from([
            "app",
            "regions.tsv",
            "--o-h5",
            "out.hdf5",
            "--prompt-kind",
            "dna"
        ])
        .is_err());
    }

    #[test]
    fn test_unsupported_genome_rejected() {
        assert!(Cli::try_parse_from([
            "app",
            "regions.tsv",
            "--o-h5",
            "out.hdf5",
            "--prompt-kind",
            "cistrome",
            "--genome",
            "mm10"
        ])
        .is_err());
    }

    #[test]
    fn test_high_resolution_alias() {
        let cli = Cli::try_parse_from([
            "app",
            "regions.tsv",
            "--o-h5",
            "out.hdf5",
            "--prompt-kind",
            "cistrome",
            "--hr",
        ])
        .unwrap();
        assert!(cli.high_resolution);
    }

    #[test]
    fn test_to_config_carries_flags() {
        let cli = Cli::try_parse_from([
            "app",
            "cells.tsv",
            "--o-h5",
            "out.hdf5",
            "--prompt-kind",
            "cistrome",
            "--prompt-celltype",
            "atac:k562",
            "--prompt-regulator-cache-limit",
            "16",
            "--prompt-regulator-cache-pin-memory",
            "--batch-size",
            "64",
            "--num-workers",
            "0",
        ])
        .unwrap();
        let config = cli.to_config();
        assert_eq!(config.prompt_celltype.as_deref(), Some("atac:k562"));
        assert_eq!(config.prompt_regulator_cache_limit, Some(16));
        assert!(config.prompt_regulator_cache_pin_memory);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.num_workers, 0);
    }
}
