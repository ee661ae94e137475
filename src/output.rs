// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! Prediction output writing.
//!
//! The output HDF5 (`--o-h5`) carries one row per supervised record, in
//! supervised-file order:
//!
//! ```text
//! /predictions     f32, [n]   imputed binding probabilities
//! /regions/chrom   str, [n]
//! /regions/start   u64, [n]
//! /regions/end     u64, [n]
//! /celltype        str, [n]   resolved cell-type key
//! /regulator       str, [n]   resolved regulator key
//! attrs: tool, version, genome, prompt_kind, model_description, config
//! ```
//!
//! Datasets are sized up front so a crashed run leaves an obviously
//! incomplete file rather than a silently truncated one; `finish` fails
//! unless every row was written.

use std::path::{Path, PathBuf};

use hdf5::types::VarLenUnicode;
use hdf5::File;

use crate::config::ImputationConfig;
use crate::error::{ImputationError, Result};
use crate::loader::Sample;

/// Incremental writer for the prediction file.
#[derive(Debug)]
pub struct PredictionWriter {
    path: PathBuf,
    _file: File,
    predictions: hdf5::Dataset,
    chrom: hdf5::Dataset,
    start: hdf5::Dataset,
    end: hdf5::Dataset,
    celltype: hdf5::Dataset,
    regulator: hdf5::Dataset,
    n: usize,
    written: usize,
}

impl PredictionWriter {
    /// Create the output file with datasets sized for `n` rows and stamp the
    /// provenance attributes.
    ///
    /// # Errors
    ///
    /// Returns an `OutputError` if the file or its parent directories cannot
    /// be created.
    pub fn create<P: AsRef<Path>>(
        path: P,
        n: usize,
        config: &ImputationConfig,
        model_description: &str,
    ) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ImputationError::OutputError(format!(
                        "Failed to create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let file = File::create(path).map_err(|e| {
            ImputationError::OutputError(format!("Failed to create {}: {e}", path.display()))
        })?;

        Self::write_attr(&file, "tool", "chrombert_imputation_cistrome_sc")?;
        Self::write_attr(&file, "version", env!("CARGO_PKG_VERSION"))?;
        Self::write_attr(&file, "genome", config.genome.as_str())?;
        Self::write_attr(&file, "prompt_kind", config.prompt_kind.as_str())?;
        Self::write_attr(&file, "model_description", model_description)?;
        Self::write_attr(&file, "config", &config.to_json()?)?;

        let predictions = file
            .new_dataset::<f32>()
            .shape(n)
            .create("predictions")
            .map_err(|e| ImputationError::OutputError(format!("Failed to create datasets: {e}")))?;
        let regions = file
            .create_group("regions")
            .map_err(|e| ImputationError::OutputError(format!("Failed to create datasets: {e}")))?;
        let chrom = Self::string_dataset(&regions, "chrom", n)?;
        let start = regions
            .new_dataset::<u64>()
            .shape(n)
            .create("start")
            .map_err(|e| ImputationError::OutputError(format!("Failed to create datasets: {e}")))?;
        let end = regions
            .new_dataset::<u64>()
            .shape(n)
            .create("end")
            .map_err(|e| ImputationError::OutputError(format!("Failed to create datasets: {e}")))?;
        let celltype = Self::string_dataset(&file, "celltype", n)?;
        let regulator = Self::string_dataset(&file, "regulator", n)?;

        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
            predictions,
            chrom,
            start,
            end,
            celltype,
            regulator,
            n,
            written: 0,
        })
    }

    fn write_attr(file: &File, name: &str, value: &str) -> Result<()> {
        let value: VarLenUnicode = value.parse().map_err(|_| {
            ImputationError::OutputError(format!("attribute '{name}' is not valid unicode"))
        })?;
        file.new_attr::<VarLenUnicode>()
            .create(name)
            .and_then(|a| a.write_scalar(&value))
            .map_err(|e| {
                ImputationError::OutputError(format!("Failed to write attribute '{name}': {e}"))
            })
    }

    fn string_dataset(parent: &hdf5::Group, name: &str, n: usize) -> Result<hdf5::Dataset> {
        parent
            .new_dataset::<VarLenUnicode>()
            .shape(n)
            .create(name)
            .map_err(|e| {
                ImputationError::OutputError(format!("Failed to create dataset '{name}': {e}"))
            })
    }

    /// Write one batch of predictions at the given row offset.
    ///
    /// # Errors
    ///
    /// Returns an `OutputError` on overflow past the supervised length, a
    /// prediction/sample count mismatch, or a failed write.
    pub fn write_batch(&mut self, offset: usize, predictions: &[f32], samples: &[Sample]) -> Result<()> {
        if predictions.len() != samples.len() {
            return Err(ImputationError::OutputError(format!(
                "{} predictions for {} samples",
                predictions.len(),
                samples.len()
            )));
        }
        let end = offset + predictions.len();
        if end > self.n {
            return Err(ImputationError::OutputError(format!(
                "batch would write rows {offset}..{end} past the supervised length {}",
                self.n
            )));
        }

        let to_unicode = |s: &str| -> Result<VarLenUnicode> {
            s.parse().map_err(|_| {
                ImputationError::OutputError(format!("'{s}' is not valid unicode for HDF5"))
            })
        };
        let chroms: Vec<VarLenUnicode> = samples
            .iter()
            .map(|s| to_unicode(&s.record.chrom))
            .collect::<Result<_>>()?;
        let starts: Vec<u64> = samples.iter().map(|s| s.record.start).collect();
        let ends: Vec<u64> = samples.iter().map(|s| s.record.end).collect();
        let celltypes: Vec<VarLenUnicode> = samples
            .iter()
            .map(|s| to_unicode(&s.celltype))
            .collect::<Result<_>>()?;
        let regulators: Vec<VarLenUnicode> = samples
            .iter()
            .map(|s| to_unicode(&s.regulator))
            .collect::<Result<_>>()?;

        let map_err =
            |e: hdf5::Error| ImputationError::OutputError(format!("Failed to write batch: {e}"));
        self.predictions
            .write_slice(predictions, (offset..end,))
            .map_err(map_err)?;
        self.chrom.write_slice(&chroms, (offset..end,)).map_err(map_err)?;
        self.start.write_slice(&starts, (offset..end,)).map_err(map_err)?;
        self.end.write_slice(&ends, (offset..end,)).map_err(map_err)?;
        self.celltype
            .write_slice(&celltypes, (offset..end,))
            .map_err(map_err)?;
        self.regulator
            .write_slice(&regulators, (offset..end,))
            .map_err(map_err)?;

        self.written += predictions.len();
        Ok(())
    }

    /// Rows written so far.
    #[must_use]
    pub const fn written(&self) -> usize {
        self.written
    }

    /// Output path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the file, verifying that every row was written.
    ///
    /// # Errors
    ///
    /// Returns an `OutputError` if fewer rows were written than the file was
    /// sized for.
    pub fn finish(self) -> Result<()> {
        if self.written != self.n {
            return Err(ImputationError::OutputError(format!(
                "output is incomplete: {} of {} rows written",
                self.written, self.n
            )));
        }
        Ok(())
    }
}
