// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! Batch processing module.
//!
//! [`BatchProcessor`] buffers loaded samples to the configured batch size,
//! assembles the input tensors, runs the model (falling back to per-sample
//! inference if the whole batch fails), and invokes a callback with the
//! predictions.

use ndarray::Array2;

use crate::error::{ImputationError, Result};
use crate::loader::Sample;
use crate::model::ChromBert;

/// A processor for handling batched inference.
///
/// The callback receives the probabilities, the samples they belong to, and
/// the running offset of the batch within the supervised file.
pub struct BatchProcessor<'a, F>
where
    F: FnMut(&[f32], &[Sample], usize) -> Result<()>,
{
    model: &'a mut ChromBert,
    batch_size: usize,
    samples: Vec<Sample>,
    callback: F,
    offset: usize,
}

impl<'a, F> BatchProcessor<'a, F>
where
    F: FnMut(&[f32], &[Sample], usize) -> Result<()>,
{
    /// Create a new `BatchProcessor`.
    pub fn new(model: &'a mut ChromBert, batch_size: usize, callback: F) -> Self {
        Self {
            model,
            batch_size,
            samples: Vec::with_capacity(batch_size),
            callback,
            offset: 0,
        }
    }

    /// Add a sample; a full batch is processed immediately.
    ///
    /// # Errors
    ///
    /// Propagates inference and callback errors.
    pub fn add(&mut self, sample: Sample) -> Result<()> {
        self.samples.push(sample);
        if self.samples.len() >= self.batch_size {
            self.process()?;
        }
        Ok(())
    }

    /// Process the remaining partial batch. A no-op when empty.
    ///
    /// # Errors
    ///
    /// Propagates inference and callback errors.
    pub fn flush(&mut self) -> Result<()> {
        self.process()
    }

    /// Samples processed so far.
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.offset
    }

    fn process(&mut self) -> Result<()> {
        if self.samples.is_empty() {
            return Ok(());
        }

        let predictions = self.run_inference()?;
        (self.callback)(&predictions, &self.samples, self.offset)?;

        self.offset += self.samples.len();
        self.samples.clear();
        Ok(())
    }

    fn run_inference(&mut self) -> Result<Vec<f32>> {
        let (input_ids, celltype, regulator) = assemble_batch(&self.samples)?;
        match self.model.predict_batch(&input_ids, &celltype, &regulator) {
            Ok(predictions) => Ok(predictions),
            Err(batch_err) => {
                crate::warn!("Batch inference failed ({batch_err}). Falling back to per-sample inference...");
                let mut fallback = Vec::with_capacity(self.samples.len());
                for sample in &self.samples {
                    let (ids, ct, rg) = assemble_batch(std::slice::from_ref(sample))?;
                    let mut single = self.model.predict_batch(&ids, &ct, &rg)?;
                    fallback.append(&mut single);
                }
                Ok(fallback)
            }
        }
    }
}

/// Assemble the three batch tensors from loaded samples.
///
/// # Errors
///
/// Returns an `InferenceError` when samples disagree on token or prompt
/// dimensions.
pub fn assemble_batch(samples: &[Sample]) -> Result<(Array2<i64>, Array2<f32>, Array2<f32>)> {
    let batch = samples.len();
    let seq_len = samples.first().map_or(0, |s| s.input_ids.len());
    let prompt_dim = samples.first().map_or(0, |s| s.celltype_emb.len());

    let mut ids = Vec::with_capacity(batch * seq_len);
    let mut celltype = Vec::with_capacity(batch * prompt_dim);
    let mut regulator = Vec::with_capacity(batch * prompt_dim);
    for sample in samples {
        if sample.input_ids.len() != seq_len
            || sample.celltype_emb.len() != prompt_dim
            || sample.regulator_emb.len() != prompt_dim
        {
            return Err(ImputationError::InferenceError(format!(
                "sample {} disagrees with the batch dimensions",
                sample.index
            )));
        }
        ids.extend_from_slice(&sample.input_ids);
        celltype.extend_from_slice(&sample.celltype_emb);
        regulator.extend_from_slice(&sample.regulator_emb);
    }

    let ids = Array2::from_shape_vec((batch, seq_len), ids)
        .map_err(|e| ImputationError::InferenceError(e.to_string()))?;
    let celltype = Array2::from_shape_vec((batch, prompt_dim), celltype)
        .map_err(|e| ImputationError::InferenceError(e.to_string()))?;
    let regulator = Array2::from_shape_vec((batch, prompt_dim), regulator)
        .map_err(|e| ImputationError::InferenceError(e.to_string()))?;
    Ok((ids, celltype, regulator))
}
