// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! Supervised input file handling.
//!
//! The supervised file is the tabular input driving a run: one genomic region
//! per row, optionally carrying a cell-type and a regulator key. TSV and CSV
//! are supported; the delimiter is chosen from the file extension and a
//! header row is auto-detected.

use std::fmt;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;

use crate::error::{ImputationError, Result};

/// One row of the supervised file.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisedRecord {
    /// Chromosome name (e.g. `chr1`).
    pub chrom: String,
    /// 0-based inclusive start of the region.
    pub start: u64,
    /// Exclusive end of the region.
    pub end: u64,
    /// Precomputed row index into the backing dataset, when the file carries one.
    pub build_region_index: Option<u64>,
    /// Supervision label, ignored during imputation but parsed when present.
    pub label: Option<f32>,
    /// Cell-type prompt key from the file, when the format supports it.
    pub celltype: Option<String>,
    /// Regulator prompt key from the file, when the format supports it.
    pub regulator: Option<String>,
}

impl SupervisedRecord {
    /// The region formatted as `chrom:start-end`.
    #[must_use]
    pub fn region(&self) -> RegionDisplay<'_> {
        RegionDisplay(self)
    }
}

/// Display adapter for a record's region coordinates.
pub struct RegionDisplay<'a>(&'a SupervisedRecord);

impl fmt::Display for RegionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.0.chrom, self.0.start, self.0.end)
    }
}

/// A parsed supervised file.
#[derive(Debug)]
pub struct SupervisedFile {
    path: PathBuf,
    records: Vec<SupervisedRecord>,
    has_celltype: bool,
    has_regulator: bool,
}

/// Column layout resolved from the header row (or positional fallback).
#[derive(Debug, Default)]
struct Columns {
    chrom: usize,
    start: usize,
    end: usize,
    build_region_index: Option<usize>,
    label: Option<usize>,
    celltype: Option<usize>,
    regulator: Option<usize>,
}

impl Columns {
    /// Positional layout for headerless files: chrom, start, end,
    /// then optionally build_region_index and label.
    fn positional(width: usize) -> Self {
        Self {
            chrom: 0,
            start: 1,
            end: 2,
            build_region_index: if width > 3 { Some(3) } else { None },
            label: if width > 4 { Some(4) } else { None },
            celltype: None,
            regulator: None,
        }
    }

    fn from_header(fields: &[&str]) -> Result<Self> {
        let mut cols = Self {
            chrom: usize::MAX,
            start: usize::MAX,
            end: usize::MAX,
            ..Self::default()
        };
        for (i, field) in fields.iter().enumerate() {
            match field.to_lowercase().as_str() {
                "chrom" | "chr" | "chromosome" => cols.chrom = i,
                "start" => cols.start = i,
                "end" => cols.end = i,
                "build_region_index" => cols.build_region_index = Some(i),
                "label" => cols.label = Some(i),
                "cell" | "celltype" | "cell_type" => cols.celltype = Some(i),
                "regulator" | "factor" => cols.regulator = Some(i),
                _ => {}
            }
        }
        for (name, idx) in [("chrom", cols.chrom), ("start", cols.start), ("end", cols.end)] {
            if idx == usize::MAX {
                return Err(ImputationError::SupervisedError(format!(
                    "header is missing the required '{name}' column"
                )));
            }
        }
        Ok(cols)
    }
}

impl SupervisedFile {
    /// Parse a supervised file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a row is malformed, a
    /// region has `start >= end`, or the file contains no records.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ImputationError::SupervisedError(format!(
                "supervised file not found: {}",
                path.display()
            )));
        }

        let delimiter = Self::delimiter_for(path);
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut rows = reader.records();
        let first = match rows.next() {
            Some(row) => row?,
            None => {
                return Err(ImputationError::SupervisedError(format!(
                    "supervised file is empty: {}",
                    path.display()
                )));
            }
        };

        let first_fields: Vec<&str> = first.iter().map(str::trim).collect();
        let has_header = !Self::looks_like_region(&first_fields);
        let columns = if has_header {
            Columns::from_header(&first_fields)?
        } else {
            Columns::positional(first_fields.len())
        };

        let mut records = Vec::new();
        if !has_header {
            records.push(Self::parse_record(&first_fields, &columns, 1)?);
        }
        for (line, row) in rows.enumerate() {
            let row = row?;
            let fields: Vec<&str> = row.iter().map(str::trim).collect();
            if fields.iter().all(|f| f.is_empty()) {
                continue;
            }
            // line numbers are 1-based and the first row was consumed above
            records.push(Self::parse_record(&fields, &columns, line + 2)?);
        }

        if records.is_empty() {
            return Err(ImputationError::SupervisedError(format!(
                "supervised file has a header but no records: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            records,
            has_celltype: columns.celltype.is_some(),
            has_regulator: columns.regulator.is_some(),
        })
    }

    /// Delimiter by extension: comma for `.csv`, tab otherwise.
    fn delimiter_for(path: &Path) -> u8 {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
            _ => b'\t',
        }
    }

    /// A data row starts with a chromosome name followed by two integers.
    fn looks_like_region(fields: &[&str]) -> bool {
        if fields.len() < 3 {
            return false;
        }
        let chrom_like = fields[0].starts_with("chr")
            || fields[0].chars().all(|c| c.is_ascii_digit())
            || matches!(fields[0], "X" | "Y" | "MT" | "M");
        chrom_like && fields[1].parse::<u64>().is_ok() && fields[2].parse::<u64>().is_ok()
    }

    fn parse_record(fields: &[&str], columns: &Columns, line: usize) -> Result<SupervisedRecord> {
        let get = |idx: usize| -> Result<&str> {
            fields.get(idx).copied().ok_or_else(|| {
                ImputationError::SupervisedError(format!(
                    "line {line}: expected at least {} columns, found {}",
                    idx + 1,
                    fields.len()
                ))
            })
        };
        let parse_u64 = |name: &str, value: &str| -> Result<u64> {
            value.parse().map_err(|_| {
                ImputationError::SupervisedError(format!(
                    "line {line}: invalid {name} '{value}'"
                ))
            })
        };

        let chrom = get(columns.chrom)?.to_string();
        if chrom.is_empty() {
            return Err(ImputationError::SupervisedError(format!(
                "line {line}: empty chromosome name"
            )));
        }
        let start = parse_u64("start", get(columns.start)?)?;
        let end = parse_u64("end", get(columns.end)?)?;
        if start >= end {
            return Err(ImputationError::SupervisedError(format!(
                "line {line}: region {chrom}:{start}-{end} has start >= end"
            )));
        }

        let optional = |idx: Option<usize>| -> Option<&str> {
            idx.and_then(|i| fields.get(i)).copied().filter(|s| !s.is_empty())
        };

        let build_region_index = match optional(columns.build_region_index) {
            Some(v) => Some(parse_u64("build_region_index", v)?),
            None => None,
        };
        let label = match optional(columns.label) {
            Some(v) => Some(v.parse::<f32>().map_err(|_| {
                ImputationError::SupervisedError(format!("line {line}: invalid label '{v}'"))
            })?),
            None => None,
        };

        Ok(SupervisedRecord {
            chrom,
            start,
            end,
            build_region_index,
            label,
            celltype: optional(columns.celltype).map(str::to_string),
            regulator: optional(columns.regulator).map(str::to_string),
        })
    }

    /// Path the file was parsed from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, in file order. Output rows follow this order.
    #[must_use]
    pub fn records(&self) -> &[SupervisedRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the file contains no records. `open` never returns one.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the file carries a cell-type column.
    #[must_use]
    pub const fn has_celltype_column(&self) -> bool {
        self.has_celltype
    }

    /// Whether the file carries a regulator column.
    #[must_use]
    pub const fn has_regulator_column(&self) -> bool {
        self.has_regulator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(ext: &str, content: &str) -> tempfile::TempPath {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{ext}"))
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.into_temp_path()
    }

    #[test]
    fn test_tsv_with_header() {
        let path = write_temp(
            "tsv",
            "chrom\tstart\tend\tcell\tregulator\n\
             chr1\t10000\t11000\tatac:k562\tctcf\n\
             chr2\t5000\t6000\tatac:k562\th3k27ac\n",
        );
        let file = SupervisedFile::open(&path).unwrap();
        assert_eq!(file.len(), 2);
        assert!(file.has_celltype_column());
        assert!(file.has_regulator_column());
        let rec = &file.records()[0];
        assert_eq!(rec.chrom, "chr1");
        assert_eq!(rec.start, 10_000);
        assert_eq!(rec.celltype.as_deref(), Some("atac:k562"));
        assert_eq!(rec.regulator.as_deref(), Some("ctcf"));
    }

    #[test]
    fn test_headerless_bed() {
        let path = write_temp("bed", "chr1\t100\t1100\nchr1\t2000\t3000\n");
        let file = SupervisedFile::open(&path).unwrap();
        assert_eq!(file.len(), 2);
        assert!(!file.has_celltype_column());
        assert_eq!(file.records()[1].start, 2000);
    }

    #[test]
    fn test_csv_delimiter() {
        let path = write_temp("csv", "chrom,start,end\nchr1,100,200\n");
        let file = SupervisedFile::open(&path).unwrap();
        assert_eq!(file.len(), 1);
        assert_eq!(file.records()[0].end, 200);
    }

    #[test]
    fn test_start_after_end_rejected() {
        let path = write_temp("tsv", "chr1\t1100\t100\n");
        let err = SupervisedFile::open(&path).unwrap_err();
        assert!(err.to_string().contains("start >= end"));
    }

    #[test]
    fn test_missing_required_column() {
        let path = write_temp("tsv", "chrom\tbegin\tstop\nchr1\t1\t2\n");
        let err = SupervisedFile::open(&path).unwrap_err();
        assert!(err.to_string().contains("start"));
    }

    #[test]
    fn test_empty_file_rejected() {
        let path = write_temp("tsv", "");
        assert!(SupervisedFile::open(&path).is_err());
    }

    #[test]
    fn test_optional_numeric_columns() {
        let path = write_temp(
            "tsv",
            "chrom\tstart\tend\tbuild_region_index\tlabel\nchr1\t100\t200\t42\t1\n",
        );
        let file = SupervisedFile::open(&path).unwrap();
        let rec = &file.records()[0];
        assert_eq!(rec.build_region_index, Some(42));
        assert_eq!(rec.label, Some(1.0));
    }

    #[test]
    fn test_region_display() {
        let path = write_temp("tsv", "chr1\t100\t200\n");
        let file = SupervisedFile::open(&path).unwrap();
        assert_eq!(file.records()[0].region().to_string(), "chr1:100-200");
    }
}
