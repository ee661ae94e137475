// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! Prompt embedding caches.
//!
//! A prompt cache is an HDF5 file with one f32 vector per key
//! (`k562`, `atac:k562`, `ctcf`, ...). Caches accelerate large-scale
//! prediction: embeddings are computed once upstream and looked up here.
//! When no cache file is given, prompts embedded in the backing dataset
//! under `prompts/celltype` and `prompts/regulator` serve as the preset
//! source.
//!
//! Two residency modes exist. Pinned mode reads every entry at open and
//! never touches the file again. Lazy mode reads entries on demand and,
//! when a limit is set, evicts the least recently used entry beyond it.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use hdf5::{File, Group};

use crate::config::ImputationConfig;
use crate::error::{ImputationError, Result};

/// Hit/miss accounting for the end-of-run summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Lookups served from memory.
    pub hits: u64,
    /// Lookups that had to read the file.
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups served from memory.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A single prompt cache (cell type or regulator).
#[derive(Debug)]
pub struct PromptCache {
    group: Group,
    // Keeps the owning file handle alive when the cache reads a sub-group.
    _file: File,
    dim: usize,
    pinned: bool,
    limit: Option<usize>,
    entries: HashMap<String, Arc<Vec<f32>>>,
    order: VecDeque<String>,
    stats: CacheStats,
    label: String,
}

impl PromptCache {
    /// Open a cache from an HDF5 file, optionally scoped to a group
    /// (the embedded-preset case).
    ///
    /// # Errors
    ///
    /// Returns a `PromptError` if the file or group cannot be opened, or if
    /// pinned preloading finds an entry with the wrong dimension.
    pub fn open<P: AsRef<Path>>(
        path: P,
        group: Option<&str>,
        dim: usize,
        pinned: bool,
        limit: Option<usize>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ImputationError::PromptError(format!(
                "failed to open prompt cache {}: {e}",
                path.display()
            ))
        })?;
        let label = match group {
            Some(g) => format!("{}:{g}", path.display()),
            None => path.display().to_string(),
        };
        let scoped = match group {
            Some(name) => file.group(name).map_err(|_| {
                ImputationError::PromptError(format!(
                    "{} has no embedded '{name}' prompts; pass a cache file instead",
                    path.display()
                ))
            })?,
            None => file.group("/").map_err(|e| {
                ImputationError::PromptError(format!(
                    "failed to open prompt cache {}: {e}",
                    path.display()
                ))
            })?,
        };

        let mut cache = Self {
            group: scoped,
            _file: file,
            dim,
            pinned,
            limit,
            entries: HashMap::new(),
            order: VecDeque::new(),
            stats: CacheStats::default(),
            label,
        };
        if pinned {
            cache.pin_all()?;
        }
        Ok(cache)
    }

    /// Open the cache configured for this run, falling back to prompts
    /// embedded in the backing dataset.
    fn open_configured(
        cache_file: Option<&Path>,
        dataset_path: &Path,
        embedded_group: &str,
        dim: usize,
        pinned: bool,
        limit: Option<usize>,
    ) -> Result<Self> {
        match cache_file {
            Some(path) => Self::open(path, None, dim, pinned, limit),
            None => Self::open(dataset_path, Some(embedded_group), dim, pinned, limit),
        }
    }

    fn pin_all(&mut self) -> Result<()> {
        let keys = self.keys()?;
        for key in keys {
            let entry = self.read_entry(&key)?;
            self.entries.insert(key, entry);
        }
        Ok(())
    }

    /// All keys present in the cache file.
    ///
    /// # Errors
    ///
    /// Returns a `PromptError` if the member listing fails.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.group.member_names().map_err(|e| {
            ImputationError::PromptError(format!("failed to list {}: {e}", self.label))
        })
    }

    fn read_entry(&self, key: &str) -> Result<Arc<Vec<f32>>> {
        let dataset = self.group.dataset(key).map_err(|_| {
            ImputationError::PromptError(format!("key '{key}' not found in {}", self.label))
        })?;
        let values: Vec<f32> = dataset.read_raw().map_err(|e| {
            ImputationError::PromptError(format!("failed to read '{key}' from {}: {e}", self.label))
        })?;
        if values.len() != self.dim {
            return Err(ImputationError::PromptError(format!(
                "'{key}' in {} has dimension {} but the run expects {}",
                self.label,
                values.len(),
                self.dim
            )));
        }
        Ok(Arc::new(values))
    }

    /// Look up an embedding, reading and caching it on a miss.
    ///
    /// # Errors
    ///
    /// Returns a `PromptError` for an unknown key or a dimension mismatch.
    pub fn get(&mut self, key: &str) -> Result<Arc<Vec<f32>>> {
        if let Some(entry) = self.entries.get(key) {
            self.stats.hits += 1;
            let entry = Arc::clone(entry);
            if !self.pinned && self.limit.is_some() {
                self.touch(key);
            }
            return Ok(entry);
        }
        if self.pinned {
            return Err(ImputationError::PromptError(format!(
                "key '{key}' not found in {}",
                self.label
            )));
        }

        self.stats.misses += 1;
        let entry = self.read_entry(key)?;
        self.entries.insert(key.to_string(), Arc::clone(&entry));
        self.order.push_back(key.to_string());
        if let Some(limit) = self.limit {
            while self.entries.len() > limit {
                if let Some(evicted) = self.order.pop_front() {
                    self.entries.remove(&evicted);
                } else {
                    break;
                }
            }
        }
        Ok(entry)
    }

    fn touch(&mut self, key: &str) {
        self.order.retain(|k| k != key);
        self.order.push_back(key.to_string());
    }

    /// Number of entries currently resident in memory.
    #[must_use]
    pub fn resident(&self) -> usize {
        self.entries.len()
    }

    /// Embedding dimension.
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Lookup statistics.
    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }
}

/// The pair of caches a run resolves prompts from.
#[derive(Debug)]
pub struct PromptStore {
    celltype: PromptCache,
    regulator: PromptCache,
}

impl PromptStore {
    /// Open both caches as configured, falling back to prompts embedded in
    /// the backing dataset. Pin-memory and the entry limit apply to the
    /// regulator cache only, matching the CLI surface.
    ///
    /// # Errors
    ///
    /// Returns a `PromptError` if either side has no usable source.
    pub fn open(config: &ImputationConfig, dataset_path: &Path) -> Result<Self> {
        let dim = config.prompt_dim_external;
        let celltype = PromptCache::open_configured(
            config.prompt_celltype_cache_file.as_deref(),
            dataset_path,
            "prompts/celltype",
            dim,
            false,
            None,
        )?;
        let regulator = PromptCache::open_configured(
            config.prompt_regulator_cache_file.as_deref(),
            dataset_path,
            "prompts/regulator",
            dim,
            config.prompt_regulator_cache_pin_memory,
            config.prompt_regulator_cache_limit,
        )?;
        Ok(Self { celltype, regulator })
    }

    /// Look up a cell-type embedding.
    ///
    /// # Errors
    ///
    /// Returns a `PromptError` for an unknown key or dimension mismatch.
    pub fn celltype(&mut self, key: &str) -> Result<Arc<Vec<f32>>> {
        self.celltype.get(key)
    }

    /// Look up a regulator embedding.
    ///
    /// # Errors
    ///
    /// Returns a `PromptError` for an unknown key or dimension mismatch.
    pub fn regulator(&mut self, key: &str) -> Result<Arc<Vec<f32>>> {
        self.regulator.get(key)
    }

    /// (cell type, regulator) lookup statistics.
    #[must_use]
    pub const fn stats(&self) -> (CacheStats, CacheStats) {
        (self.celltype.stats(), self.regulator.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_cache(dir: &Path, entries: &[(&str, Vec<f32>)]) -> PathBuf {
        let path = dir.join("cache.hdf5");
        let file = File::create(&path).unwrap();
        for (key, values) in entries {
            file.new_dataset::<f32>()
                .shape(values.len())
                .create(*key)
                .unwrap()
                .write(values)
                .unwrap();
        }
        path
    }

    #[test]
    fn test_lazy_lookup_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cache(dir.path(), &[("ctcf", vec![1.0; 4]), ("ep300", vec![2.0; 4])]);
        let mut cache = PromptCache::open(&path, None, 4, false, None).unwrap();

        assert_eq!(cache.resident(), 0);
        let first = cache.get("ctcf").unwrap();
        assert_eq!(first.len(), 4);
        let _ = cache.get("ctcf").unwrap();
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
        assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pinned_preloads_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cache(dir.path(), &[("ctcf", vec![1.0; 4]), ("ep300", vec![2.0; 4])]);
        let mut cache = PromptCache::open(&path, None, 4, true, None).unwrap();
        assert_eq!(cache.resident(), 2);
        assert!(cache.get("ctcf").is_ok());
        assert!(cache.get("missing").is_err());
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_lru_eviction_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cache(
            dir.path(),
            &[
                ("a", vec![0.0; 2]),
                ("b", vec![1.0; 2]),
                ("c", vec![2.0; 2]),
            ],
        );
        let mut cache = PromptCache::open(&path, None, 2, false, Some(2)).unwrap();
        cache.get("a").unwrap();
        cache.get("b").unwrap();
        cache.get("a").unwrap(); // refresh a; b is now least recent
        cache.get("c").unwrap(); // evicts b
        assert_eq!(cache.resident(), 2);
        let misses_before = cache.stats().misses;
        cache.get("b").unwrap(); // re-read from file
        assert_eq!(cache.stats().misses, misses_before + 1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cache(dir.path(), &[("ctcf", vec![1.0; 4])]);
        let mut cache = PromptCache::open(&path, None, 8, false, None).unwrap();
        let err = cache.get("ctcf").unwrap_err();
        assert!(err.to_string().contains("dimension 4"));
    }

    #[test]
    fn test_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cache(dir.path(), &[("ctcf", vec![1.0; 4])]);
        let mut cache = PromptCache::open(&path, None, 4, false, None).unwrap();
        let err = cache.get("nfkb").unwrap_err();
        assert!(err.to_string().contains("nfkb"));
    }

    #[test]
    fn test_embedded_group_fallback_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cache(dir.path(), &[("ctcf", vec![1.0; 4])]);
        let err = PromptCache::open(&path, Some("prompts/celltype"), 4, false, None).unwrap_err();
        assert!(err.to_string().contains("embedded"));
    }

    #[test]
    fn test_embedded_group_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.hdf5");
        let file = File::create(&path).unwrap();
        let group = file.create_group("prompts/celltype").unwrap();
        group
            .new_dataset::<f32>()
            .shape(4)
            .create("atac:k562")
            .unwrap()
            .write(&vec![0.5f32; 4])
            .unwrap();
        drop(group);
        drop(file);

        let mut cache = PromptCache::open(&path, Some("prompts/celltype"), 4, false, None).unwrap();
        assert_eq!(cache.get("atac:k562").unwrap().len(), 4);
    }
}
