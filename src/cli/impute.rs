// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::batch::BatchProcessor;
use crate::cache::PromptStore;
use crate::cli::args::Cli;
use crate::config::ImputationConfig;
use crate::dataset::Dataset;
use crate::download;
use crate::error::{ImputationError, Result};
use crate::loader::SampleLoader;
use crate::model::ChromBert;
use crate::output::PredictionWriter;
use crate::prompt::PromptResolver;
use crate::supervised::SupervisedFile;
use crate::{error, success, verbose, VERSION};

/// Run cistrome imputation end to end.
///
/// Prints errors through the CLI error macro and exits nonzero, so the shell
/// contract stays simple: 0 on a complete output file, 1 otherwise.
pub fn run_imputation(args: &Cli) {
    if let Err(e) = run(args) {
        error!("{e}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
fn run(args: &Cli) -> Result<()> {
    let mut config = args.to_config();
    config.validate()?;

    let basedir = args
        .basedir
        .clone()
        .unwrap_or_else(download::default_basedir);
    let genome = config.genome;
    let bin_size = config.bin_size();

    verbose!(
        "chrombert_imputation_cistrome_sc {VERSION} ({genome}, {bin_size} bins, {} prompts)",
        config.prompt_kind
    );

    // Explicit paths must exist; inferred artifacts download into the basedir.
    let pretrain = match &args.pretrain_ckpt {
        Some(path) => download::resolve_explicit(&basedir, path, "--pretrain-ckpt")?,
        None => download::ensure_artifact(
            &basedir,
            &download::pretrain_checkpoint_name(genome, bin_size),
        )?,
    };
    let finetune: Option<PathBuf> = match &args.finetune_ckpt {
        Some(path) => Some(download::resolve_explicit(&basedir, path, "--finetune-ckpt")?),
        None => None,
    };
    let dataset_path = match &args.hdf5_file {
        Some(path) => download::resolve_explicit(&basedir, path, "--hdf5-file")?,
        None => download::ensure_artifact(&basedir, &download::dataset_name(genome, bin_size))?,
    };
    if let Some(path) = &args.prompt_celltype_cache_file {
        config.prompt_celltype_cache_file = Some(download::resolve_explicit(
            &basedir,
            path,
            "--prompt-celltype-cache-file",
        )?);
    }
    if let Some(path) = &args.prompt_regulator_cache_file {
        config.prompt_regulator_cache_file = Some(download::resolve_explicit(
            &basedir,
            path,
            "--prompt-regulator-cache-file",
        )?);
    }

    let supervised = SupervisedFile::open(&args.supervised_file)?;
    let total = supervised.len();
    verbose!(
        "{total} records from {} (celltype column: {}, regulator column: {})",
        supervised.path().display(),
        if supervised.has_celltype_column() { "yes" } else { "no" },
        if supervised.has_regulator_column() { "yes" } else { "no" }
    );

    let dataset = Dataset::open(&dataset_path, genome, bin_size)?;
    verbose!(
        "dataset {}: {} regions, {} tokens per region",
        dataset_path.display(),
        dataset.len(),
        dataset.seq_len()
    );
    let rows = dataset.resolve_rows(supervised.records())?;

    let store = PromptStore::open(&config, dataset.path())?;

    let mut model = ChromBert::load(&pretrain, finetune.as_deref())?;
    model.check_compatibility(genome, bin_size, dataset.seq_len(), config.prompt_dim_external)?;
    verbose!(
        "{}: prompt dim {}{}",
        model.metadata().model_name(),
        model.prompt_dim(),
        finetune
            .as_ref()
            .map(|p| format!(", fine-tuned graph {}", p.display()))
            .unwrap_or_default()
    );

    let mut writer = PredictionWriter::create(
        &args.o_h5,
        total,
        &config,
        model.metadata().model_name(),
    )?;
    let out_path = writer.path().to_path_buf();

    let records = Arc::new(supervised.records().to_vec());
    let store = Arc::new(Mutex::new(store));
    let resolver = Arc::new(PromptResolver::new(
        config.prompt_celltype.clone(),
        config.prompt_regulator.clone(),
    ));
    let loader = SampleLoader::spawn(
        records,
        Arc::new(rows),
        &dataset,
        Arc::clone(&store),
        resolver,
        config.num_workers,
        config.batch_size,
    )?;

    let start = Instant::now();
    {
        let writer = &mut writer;
        let mut processor =
            BatchProcessor::new(&mut model, config.batch_size, |predictions, samples, offset| {
                writer.write_batch(offset, predictions, samples)?;
                verbose!("imputed {}/{total} rows", offset + samples.len());
                Ok(())
            });
        for sample in loader {
            processor.add(sample?)?;
        }
        processor.flush()?;
    }
    writer.finish()?;
    let elapsed = start.elapsed().as_secs_f64();

    report_cache_stats(&config, &store)?;
    verbose!(
        "{total} rows in {elapsed:.1}s ({:.0} rows/s, batch size {})",
        total as f64 / elapsed.max(1e-9),
        config.batch_size
    );
    success!("Results saved to {}", out_path.display());
    Ok(())
}

fn report_cache_stats(config: &ImputationConfig, store: &Arc<Mutex<PromptStore>>) -> Result<()> {
    let (celltype, regulator) = store
        .lock()
        .map_err(|_| ImputationError::PromptError("prompt cache lock poisoned".to_string()))?
        .stats();
    verbose!(
        "prompt cache: celltype {:.0}% hit, regulator {:.0}% hit{}",
        celltype.hit_rate() * 100.0,
        regulator.hit_rate() * 100.0,
        config
            .prompt_regulator_cache_limit
            .map(|l| format!(" (limit {l})"))
            .unwrap_or_default()
    );
    Ok(())
}
