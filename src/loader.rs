// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! Parallel sample loading.
//!
//! Loading a sample means reading the region's token row from the backing
//! dataset and resolving its prompt embedding pair. With `--num-workers`
//! above zero, worker threads pull record indices from a shared counter and
//! push finished samples over a bounded channel; the consumer restores
//! supervised-file order before batching, so output row `i` always
//! corresponds to supervised record `i`. `--num-workers 0` loads inline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::cache::PromptStore;
use crate::dataset::{Dataset, TokenReader};
use crate::error::{ImputationError, Result};
use crate::prompt::PromptResolver;
use crate::supervised::SupervisedRecord;

/// One fully loaded record, ready for batching.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Position in the supervised file.
    pub index: usize,
    /// The supervised record itself.
    pub record: SupervisedRecord,
    /// Resolved cell-type key.
    pub celltype: String,
    /// Resolved regulator key.
    pub regulator: String,
    /// Token row from the backing dataset.
    pub input_ids: Vec<i64>,
    /// Cell-type prompt embedding.
    pub celltype_emb: Arc<Vec<f32>>,
    /// Regulator prompt embedding.
    pub regulator_emb: Arc<Vec<f32>>,
}

/// Shared inputs each loading path needs.
struct LoadContext {
    records: Arc<Vec<SupervisedRecord>>,
    rows: Arc<Vec<usize>>,
    resolver: Arc<PromptResolver>,
    store: Arc<Mutex<PromptStore>>,
}

impl LoadContext {
    fn build_sample(&self, reader: &TokenReader, index: usize) -> Result<Sample> {
        let record = &self.records[index];
        let celltype = self.resolver.celltype_key(record)?;
        let regulator = self.resolver.regulator_key(record)?;
        let input_ids = reader.read_row(self.rows[index])?;
        let (celltype_emb, regulator_emb) = {
            let mut store = self.store.lock().map_err(|_| {
                ImputationError::PromptError("prompt cache lock poisoned".to_string())
            })?;
            (store.celltype(&celltype)?, store.regulator(&regulator)?)
        };
        Ok(Sample {
            index,
            record: record.clone(),
            celltype,
            regulator,
            input_ids,
            celltype_emb,
            regulator_emb,
        })
    }
}

/// Yields samples in supervised-file order, loading them inline or on
/// worker threads.
pub struct SampleLoader {
    inner: LoaderInner,
}

enum LoaderInner {
    Inline(InlineLoader),
    Threaded(ThreadedLoader),
}

struct InlineLoader {
    context: LoadContext,
    reader: TokenReader,
    next: usize,
}

struct ThreadedLoader {
    rx: Receiver<(usize, Result<Sample>)>,
    pending: HashMap<usize, Sample>,
    next_expected: usize,
    total: usize,
    failed: bool,
    _handles: Vec<JoinHandle<()>>,
}

impl SampleLoader {
    /// Start loading samples for every record.
    ///
    /// `rows` holds the pre-resolved dataset row of each record. The channel
    /// is bounded at twice the batch size so decoding stays ahead of
    /// inference without buffering the whole run.
    ///
    /// # Errors
    ///
    /// Returns an error if a per-worker dataset handle cannot be opened.
    pub fn spawn(
        records: Arc<Vec<SupervisedRecord>>,
        rows: Arc<Vec<usize>>,
        dataset: &Dataset,
        store: Arc<Mutex<PromptStore>>,
        resolver: Arc<PromptResolver>,
        num_workers: usize,
        batch_size: usize,
    ) -> Result<Self> {
        let total = records.len();
        let context = LoadContext {
            records,
            rows,
            resolver,
            store,
        };

        if num_workers == 0 {
            let reader = dataset.token_reader()?;
            return Ok(Self {
                inner: LoaderInner::Inline(InlineLoader {
                    context,
                    reader,
                    next: 0,
                }),
            });
        }

        let workers = num_workers.min(total.max(1));
        let (tx, rx) = std::sync::mpsc::sync_channel(batch_size.max(1) * 2);
        let counter = Arc::new(AtomicUsize::new(0));
        let context = Arc::new(context);

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let reader = dataset.token_reader()?;
            let tx: SyncSender<(usize, Result<Sample>)> = tx.clone();
            let counter = Arc::clone(&counter);
            let context = Arc::clone(&context);
            handles.push(std::thread::spawn(move || {
                loop {
                    let index = counter.fetch_add(1, Ordering::SeqCst);
                    if index >= context.records.len() {
                        break;
                    }
                    let sample = context.build_sample(&reader, index);
                    let errored = sample.is_err();
                    if tx.send((index, sample)).is_err() || errored {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        Ok(Self {
            inner: LoaderInner::Threaded(ThreadedLoader {
                rx,
                pending: HashMap::new(),
                next_expected: 0,
                total,
                failed: false,
                _handles: handles,
            }),
        })
    }
}

impl Iterator for SampleLoader {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            LoaderInner::Inline(inline) => {
                if inline.next >= inline.context.records.len() {
                    return None;
                }
                let sample = inline.context.build_sample(&inline.reader, inline.next);
                inline.next += 1;
                Some(sample)
            }
            LoaderInner::Threaded(threaded) => {
                if threaded.failed || threaded.next_expected >= threaded.total {
                    return None;
                }
                loop {
                    if let Some(sample) = threaded.pending.remove(&threaded.next_expected) {
                        threaded.next_expected += 1;
                        return Some(Ok(sample));
                    }
                    match threaded.rx.recv() {
                        Ok((_, Err(e))) => {
                            threaded.failed = true;
                            return Some(Err(e));
                        }
                        Ok((index, Ok(sample))) => {
                            threaded.pending.insert(index, sample);
                        }
                        Err(_) => {
                            threaded.failed = true;
                            return Some(Err(ImputationError::InferenceError(format!(
                                "sample loader stopped early at record {} of {}",
                                threaded.next_expected, threaded.total
                            ))));
                        }
                    }
                }
            }
        }
    }
}
