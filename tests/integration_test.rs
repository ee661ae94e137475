// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! Integration tests for the imputation library.
//!
//! Everything up to the ONNX session boundary is exercised against real
//! files: supervised parsing, dataset lookup, parallel loading, batching and
//! the output writer. Inference itself needs an exported checkpoint and is
//! covered by the ignored test at the bottom.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::Parser;
use hdf5::types::VarLenUnicode;

use chrombert_imputation::batch::assemble_batch;
use chrombert_imputation::cli::args::Cli;
use chrombert_imputation::{
    BinSize, Dataset, Genome, ImputationConfig, PredictionWriter, PromptKind, PromptResolver,
    PromptStore, SampleLoader, SupervisedFile,
};

const SEQ_LEN: usize = 16;
const PROMPT_DIM: usize = 8;

/// Write a small backing dataset with embedded prompts for both sides.
fn write_dataset(dir: &Path, n: usize) -> PathBuf {
    let path = dir.join("dataset.hdf5");
    let file = hdf5::File::create(&path).unwrap();

    let genome: VarLenUnicode = "hg38".parse().unwrap();
    file.new_attr::<VarLenUnicode>()
        .create("genome")
        .unwrap()
        .write_scalar(&genome)
        .unwrap();
    let bin: VarLenUnicode = "1kb".parse().unwrap();
    file.new_attr::<VarLenUnicode>()
        .create("bin_size")
        .unwrap()
        .write_scalar(&bin)
        .unwrap();

    let regions = file.create_group("regions").unwrap();
    let chroms: Vec<VarLenUnicode> = (0..n).map(|_| "chr1".parse().unwrap()).collect();
    regions
        .new_dataset::<VarLenUnicode>()
        .shape(n)
        .create("chrom")
        .unwrap()
        .write(&chroms)
        .unwrap();
    let starts: Vec<u64> = (0..n as u64).map(|i| i * 1000).collect();
    regions
        .new_dataset::<u64>()
        .shape(n)
        .create("start")
        .unwrap()
        .write(&starts)
        .unwrap();
    let ends: Vec<u64> = starts.iter().map(|s| s + 1000).collect();
    regions
        .new_dataset::<u64>()
        .shape(n)
        .create("end")
        .unwrap()
        .write(&ends)
        .unwrap();

    let tokens: Vec<u32> = (0..n)
        .flat_map(|r| std::iter::repeat(5 + (r as u32 % 5)).take(SEQ_LEN))
        .collect();
    file.new_dataset::<u32>()
        .shape((n, SEQ_LEN))
        .create("tokens")
        .unwrap()
        .write_raw(&tokens)
        .unwrap();

    let celltype = file.create_group("prompts/celltype").unwrap();
    celltype
        .new_dataset::<f32>()
        .shape(PROMPT_DIM)
        .create("atac:k562")
        .unwrap()
        .write(&vec![0.25f32; PROMPT_DIM])
        .unwrap();
    let regulator = file.create_group("prompts/regulator").unwrap();
    for (key, fill) in [("ctcf", 0.5f32), ("ep300", 0.75f32)] {
        regulator
            .new_dataset::<f32>()
            .shape(PROMPT_DIM)
            .create(key)
            .unwrap()
            .write(&vec![fill; PROMPT_DIM])
            .unwrap();
    }

    path
}

fn write_supervised(dir: &Path, n: usize) -> PathBuf {
    let path = dir.join("regions.tsv");
    let mut text = String::from("chrom\tstart\tend\tcell\tregulator\n");
    for i in 0..n {
        let regulator = if i % 2 == 0 { "ctcf" } else { "ep300" };
        text.push_str(&format!(
            "chr1\t{}\t{}\tatac:k562\t{regulator}\n",
            i * 1000,
            i * 1000 + 1000
        ));
    }
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_cli_contract_requires_all_three() {
    // missing --o-h5, --prompt-kind or the positional file must fail
    assert!(Cli::try_parse_from(["app", "r.tsv", "--prompt-kind", "cistrome"]).is_err());
    assert!(Cli::try_parse_from(["app", "r.tsv", "--o-h5", "o.hdf5"]).is_err());
    assert!(Cli::try_parse_from(["app", "--o-h5", "o.hdf5", "--prompt-kind", "cistrome"]).is_err());
    assert!(
        Cli::try_parse_from(["app", "r.tsv", "--o-h5", "o.hdf5", "--prompt-kind", "cistrome"])
            .is_ok()
    );
    assert!(
        Cli::try_parse_from(["app", "r.tsv", "--o-h5", "o.hdf5", "--prompt-kind", "expression"])
            .is_ok()
    );
}

#[test]
fn test_high_resolution_parses_but_fails_validation() {
    let cli = Cli::try_parse_from([
        "app",
        "r.tsv",
        "--o-h5",
        "o.hdf5",
        "--prompt-kind",
        "cistrome",
        "--high-resolution",
    ])
    .unwrap();
    let err = cli.to_config().validate().unwrap_err();
    assert!(err.to_string().contains("not yet available"));
}

/// The full pipeline short of the ONNX session: parse, resolve, load in
/// parallel, batch, and write predictions in supervised order.
#[test]
fn test_pipeline_without_model() {
    let dir = tempfile::tempdir().unwrap();
    let n = 21;
    let dataset_path = write_dataset(dir.path(), n);
    let supervised_path = write_supervised(dir.path(), n);
    let out_path = dir.path().join("out/predictions.hdf5");

    let config = ImputationConfig::new(PromptKind::Cistrome)
        .with_prompt_dim_external(PROMPT_DIM)
        .with_batch_size(4)
        .with_num_workers(3);
    config.validate().unwrap();

    let supervised = SupervisedFile::open(&supervised_path).unwrap();
    assert_eq!(supervised.len(), n);

    let dataset = Dataset::open(&dataset_path, Genome::Hg38, BinSize::Kb1).unwrap();
    assert_eq!(dataset.seq_len(), SEQ_LEN);
    let rows = dataset.resolve_rows(supervised.records()).unwrap();

    let store = PromptStore::open(&config, dataset.path()).unwrap();
    let store = Arc::new(Mutex::new(store));
    let resolver = Arc::new(PromptResolver::default());

    let loader = SampleLoader::spawn(
        Arc::new(supervised.records().to_vec()),
        Arc::new(rows),
        &dataset,
        Arc::clone(&store),
        resolver,
        config.num_workers,
        config.batch_size,
    )
    .unwrap();

    let mut writer =
        PredictionWriter::create(&out_path, n, &config, "integration fixture").unwrap();
    assert!(out_path.exists(), "--o-h5 file must be created up front");

    let mut batch = Vec::new();
    let mut offset = 0;
    let mut flush = |batch: &mut Vec<chrombert_imputation::Sample>, offset: &mut usize| {
        if batch.is_empty() {
            return;
        }
        let (ids, celltype, regulator) = assemble_batch(batch).unwrap();
        assert_eq!(ids.ncols(), SEQ_LEN);
        assert_eq!(celltype.ncols(), PROMPT_DIM);
        assert_eq!(regulator.ncols(), PROMPT_DIM);
        // stand-in for the model: one probability per row
        let fake: Vec<f32> = batch.iter().map(|s| s.index as f32 / n as f32).collect();
        writer.write_batch(*offset, &fake, batch).unwrap();
        *offset += batch.len();
        batch.clear();
    };

    for sample in loader {
        let sample = sample.unwrap();
        batch.push(sample);
        if batch.len() == config.batch_size {
            flush(&mut batch, &mut offset);
        }
    }
    flush(&mut batch, &mut offset);
    drop(flush);
    writer.finish().unwrap();

    // verify order and content
    let file = hdf5::File::open(&out_path).unwrap();
    let predictions: Vec<f32> = file.dataset("predictions").unwrap().read_raw().unwrap();
    assert_eq!(predictions.len(), n);
    for (i, p) in predictions.iter().enumerate() {
        assert!((p - i as f32 / n as f32).abs() < 1e-6, "row {i} out of order");
    }
    let starts: Vec<u64> = file.dataset("regions/start").unwrap().read_raw().unwrap();
    assert_eq!(starts[5], 5000);
    let regulators: Vec<VarLenUnicode> = file.dataset("regulator").unwrap().read_raw().unwrap();
    assert_eq!(regulators[0].as_str(), "ctcf");
    assert_eq!(regulators[1].as_str(), "ep300");

    let kind = file
        .attr("prompt_kind")
        .unwrap()
        .read_scalar::<VarLenUnicode>()
        .unwrap();
    assert_eq!(kind.as_str(), "cistrome");

    // both regulator keys were resolved through the embedded prompts
    let (celltype_stats, regulator_stats) = store.lock().unwrap().stats();
    assert_eq!(celltype_stats.misses, 1);
    assert_eq!(regulator_stats.misses, 2);
    assert_eq!(
        celltype_stats.hits + celltype_stats.misses,
        n as u64
    );
}

#[test]
fn test_missing_region_fails_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let dataset_path = write_dataset(dir.path(), 4);
    let supervised_path = dir.path().join("bad.tsv");
    std::fs::write(&supervised_path, "chr7\t999000\t1000000\n").unwrap();

    let supervised = SupervisedFile::open(&supervised_path).unwrap();
    let dataset = Dataset::open(&dataset_path, Genome::Hg38, BinSize::Kb1).unwrap();
    let err = dataset.resolve_rows(supervised.records()).unwrap_err();
    assert!(err.to_string().contains("chr7:999000-1000000"));
}

#[test]
#[ignore = "requires an exported ChromBERT checkpoint - run with --include-ignored"]
fn test_end_to_end_with_checkpoint() {
    use chrombert_imputation::ChromBert;

    let dir = tempfile::tempdir().unwrap();
    let dataset_path = write_dataset(dir.path(), 8);
    let mut model = ChromBert::load("hg38_6k_1kb_pretrain.onnx", None).unwrap();
    let dataset = Dataset::open(&dataset_path, Genome::Hg38, BinSize::Kb1).unwrap();
    model
        .check_compatibility(Genome::Hg38, BinSize::Kb1, dataset.seq_len(), PROMPT_DIM)
        .unwrap();
}
