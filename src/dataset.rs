// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! Backing reference-cistrome dataset.
//!
//! The dataset HDF5 (`-d/--hdf5-file`) stores one row of regulator-signal
//! token ids per genomic bin:
//!
//! ```text
//! /regions/chrom   str,  [n]
//! /regions/start   u64,  [n]
//! /regions/end     u64,  [n]
//! /tokens          u32,  [n, seq_len]
//! attrs: genome, bin_size
//! ```
//!
//! Region lookup is keyed on `(chrom, start)`; bins have fixed width so the
//! start coordinate identifies the bin. The token matrix is read per row,
//! never whole: at 1 kb resolution it spans millions of regions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hdf5::types::VarLenUnicode;
use hdf5::File;

use crate::error::{ImputationError, Result};
use crate::genome::{BinSize, Genome};
use crate::supervised::SupervisedRecord;

/// Token ids are signal levels shifted past the special ids.
pub const VOCAB_SHIFT: u32 = 5;

/// Number of discretized signal levels.
pub const VOCAB_LEVELS: u32 = 5;

/// Padding token id.
pub const TOKEN_ID_PAD: u32 = 0;

/// Padding position id.
pub const POSITION_ID_PAD: u32 = 0;

/// In-memory index from `(chrom, start)` to dataset row.
#[derive(Debug)]
pub struct RegionIndex {
    rows: HashMap<(String, u64), usize>,
    len: usize,
}

impl RegionIndex {
    /// Number of regions in the dataset.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the dataset has no regions.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Row index of a region, if present.
    #[must_use]
    pub fn row(&self, chrom: &str, start: u64) -> Option<usize> {
        self.rows.get(&(chrom.to_string(), start)).copied()
    }
}

/// An open backing dataset with its region index.
#[derive(Debug)]
pub struct Dataset {
    path: PathBuf,
    index: Arc<RegionIndex>,
    seq_len: usize,
}

impl Dataset {
    /// Open the dataset, validate its layout and attributes, and build the
    /// region index.
    ///
    /// # Errors
    ///
    /// Returns a `DatasetError` if the layout is malformed, the region
    /// columns disagree in length, or the `genome`/`bin_size` attributes
    /// contradict the run configuration.
    pub fn open<P: AsRef<Path>>(path: P, genome: Genome, bin_size: BinSize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ImputationError::DatasetError(format!("failed to open {}: {e}", path.display()))
        })?;

        Self::check_attr(&file, "genome", genome.as_str())?;
        Self::check_attr(&file, "bin_size", bin_size.as_str())?;

        let regions = file.group("regions").map_err(|e| {
            ImputationError::DatasetError(format!("missing 'regions' group: {e}"))
        })?;
        let chroms: Vec<VarLenUnicode> = regions
            .dataset("chrom")
            .and_then(|d| d.read_raw())
            .map_err(|e| ImputationError::DatasetError(format!("bad 'regions/chrom': {e}")))?;
        let starts: Vec<u64> = regions
            .dataset("start")
            .and_then(|d| d.read_raw())
            .map_err(|e| ImputationError::DatasetError(format!("bad 'regions/start': {e}")))?;
        if chroms.len() != starts.len() {
            return Err(ImputationError::DatasetError(format!(
                "region columns disagree: {} chroms vs {} starts",
                chroms.len(),
                starts.len()
            )));
        }

        let tokens = file.dataset("tokens").map_err(|e| {
            ImputationError::DatasetError(format!("missing 'tokens' dataset: {e}"))
        })?;
        let shape = tokens.shape();
        if shape.len() != 2 {
            return Err(ImputationError::DatasetError(format!(
                "'tokens' must be 2-dimensional, found shape {shape:?}"
            )));
        }
        if shape[0] != chroms.len() {
            return Err(ImputationError::DatasetError(format!(
                "'tokens' has {} rows but 'regions' describes {}",
                shape[0],
                chroms.len()
            )));
        }
        let seq_len = shape[1];

        let mut rows = HashMap::with_capacity(chroms.len());
        for (row, (chrom, start)) in chroms.iter().zip(starts.iter()).enumerate() {
            rows.insert((chrom.to_string(), *start), row);
        }

        Ok(Self {
            path: path.to_path_buf(),
            index: Arc::new(RegionIndex {
                len: chroms.len(),
                rows,
            }),
            seq_len,
        })
    }

    fn check_attr(file: &File, name: &str, expected: &str) -> Result<()> {
        // Older dataset exports carry no attributes; only a contradiction fails.
        let Ok(attr) = file.attr(name) else {
            return Ok(());
        };
        let value = attr.read_scalar::<VarLenUnicode>().map_err(|e| {
            ImputationError::DatasetError(format!("unreadable '{name}' attribute: {e}"))
        })?;
        if value.as_str() != expected {
            return Err(ImputationError::DatasetError(format!(
                "dataset {name} is '{}' but the run expects '{expected}'",
                value.as_str()
            )));
        }
        Ok(())
    }

    /// Dataset path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the dataset has no regions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Regulator tokens per region.
    #[must_use]
    pub const fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Shared region index.
    #[must_use]
    pub fn index(&self) -> Arc<RegionIndex> {
        Arc::clone(&self.index)
    }

    /// Resolve every supervised record to its dataset row.
    ///
    /// A record carrying `build_region_index` uses it directly (bounds
    /// checked); otherwise the region is looked up by `(chrom, start)`.
    ///
    /// # Errors
    ///
    /// Returns a `DatasetError` naming the first unresolvable region.
    pub fn resolve_rows(&self, records: &[SupervisedRecord]) -> Result<Vec<usize>> {
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let row = match record.build_region_index {
                Some(idx) => {
                    let idx = idx as usize;
                    if idx >= self.index.len() {
                        return Err(ImputationError::DatasetError(format!(
                            "build_region_index {idx} for {} is out of range ({} regions)",
                            record.region(),
                            self.index.len()
                        )));
                    }
                    idx
                }
                None => self.index.row(&record.chrom, record.start).ok_or_else(|| {
                    ImputationError::DatasetError(format!(
                        "region {} is not in the dataset {}",
                        record.region(),
                        self.path.display()
                    ))
                })?,
            };
            rows.push(row);
        }
        Ok(rows)
    }

    /// Open an independent token reader, e.g. one per loader worker.
    ///
    /// # Errors
    ///
    /// Returns a `DatasetError` if the file cannot be reopened.
    pub fn token_reader(&self) -> Result<TokenReader> {
        TokenReader::open(&self.path, self.seq_len)
    }
}

/// A per-thread handle for reading token rows.
#[derive(Debug)]
pub struct TokenReader {
    tokens: hdf5::Dataset,
    seq_len: usize,
}

impl TokenReader {
    fn open(path: &Path, seq_len: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            ImputationError::DatasetError(format!("failed to reopen {}: {e}", path.display()))
        })?;
        let tokens = file.dataset("tokens")?;
        Ok(Self { tokens, seq_len })
    }

    /// Read one region's token row, widened to the model input type.
    ///
    /// # Errors
    ///
    /// Returns a `DatasetError` if the read fails or a token id falls
    /// outside the vocabulary.
    pub fn read_row(&self, row: usize) -> Result<Vec<i64>> {
        let arr = self
            .tokens
            .read_slice_2d::<u32, _>((row..row + 1, ..))
            .map_err(|e| {
                ImputationError::DatasetError(format!("failed to read token row {row}: {e}"))
            })?;
        let raw = arr.into_raw_vec();
        debug_assert_eq!(raw.len(), self.seq_len);
        for &token in &raw {
            if token != TOKEN_ID_PAD && !(VOCAB_SHIFT..VOCAB_SHIFT + VOCAB_LEVELS).contains(&token)
            {
                return Err(ImputationError::DatasetError(format!(
                    "token id {token} in row {row} is outside the vocabulary"
                )));
            }
        }
        Ok(raw.into_iter().map(i64::from).collect())
    }

    /// Regulator tokens per region.
    #[must_use]
    pub const fn seq_len(&self) -> usize {
        self.seq_len
    }
}
