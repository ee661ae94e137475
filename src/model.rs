// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

//! ChromBERT checkpoint loading and inference.
//!
//! The model is an opaque ONNX graph: a pretrained backbone with the
//! imputation head, optionally superseded by a fine-tuned export. This
//! module wraps the ONNX Runtime session; it never reconstructs layers.

use std::collections::HashMap;
use std::path::Path;

use ndarray::Array2;
use ort::session::Session;
use ort::value::TensorRef;

use crate::error::{ImputationError, Result};
use crate::metadata::ModelMetadata;

/// Expected graph input names, in declaration order.
const INPUT_NAMES: [&str; 3] = ["input_ids", "celltype_prompt", "regulator_prompt"];

/// Metadata keys read from the ONNX custom properties.
const METADATA_KEYS: [&str; 8] = [
    "description",
    "version",
    "genome",
    "bin_size",
    "seq_len",
    "hidden_size",
    "prompt_dim",
    "metadata",
];

/// A loaded ChromBERT checkpoint.
///
/// # Example
///
/// ```no_run
/// use chrombert_imputation::ChromBert;
///
/// let model = ChromBert::load("hg38_6k_1kb_pretrain.onnx", None)?;
/// println!("{} tokens per region", model.seq_len());
/// # Ok::<(), chrombert_imputation::ImputationError>(())
/// ```
pub struct ChromBert {
    /// ONNX Runtime session.
    session: Session,
    /// Checkpoint metadata (genome, bin size, dimensions).
    metadata: ModelMetadata,
    /// Graph input names, resolved against [`INPUT_NAMES`].
    input_names: Vec<String>,
    /// First graph output name.
    output_name: String,
    /// Whether the model has been warmed up.
    warmed_up: bool,
}

impl ChromBert {
    /// Load a checkpoint pair.
    ///
    /// The pretrained path must exist even when a fine-tuned checkpoint is
    /// given; the fine-tuned graph supersedes the pretrained one at run time.
    ///
    /// # Errors
    ///
    /// Returns an error if either file is missing or the session cannot be
    /// built.
    pub fn load<P: AsRef<Path>>(pretrain_ckpt: P, finetune_ckpt: Option<&Path>) -> Result<Self> {
        let pretrain = pretrain_ckpt.as_ref();
        if !pretrain.exists() {
            return Err(ImputationError::ModelLoadError(format!(
                "Pretrained checkpoint not found: {}",
                pretrain.display()
            )));
        }
        if let Some(finetune) = finetune_ckpt {
            if !finetune.exists() {
                return Err(ImputationError::ModelLoadError(format!(
                    "Fine-tuned checkpoint not found: {}",
                    finetune.display()
                )));
            }
        }
        let graph = finetune_ckpt.unwrap_or(pretrain);

        let session = Session::builder()
            .map_err(|e| {
                ImputationError::ModelLoadError(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| {
                ImputationError::ModelLoadError(format!("Failed to set optimization level: {e}"))
            })?
            .with_intra_threads(0)
            .map_err(|e| {
                ImputationError::ModelLoadError(format!("Failed to set intra-thread count: {e}"))
            })?
            .commit_from_file(graph)
            .map_err(|e| {
                ImputationError::ModelLoadError(format!(
                    "Failed to load {}: {e}",
                    graph.display()
                ))
            })?;

        let metadata = Self::extract_metadata(&session)?;
        let input_names = Self::resolve_input_names(&session)?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "logits".to_string());

        Ok(Self {
            session,
            metadata,
            input_names,
            output_name,
            warmed_up: false,
        })
    }

    /// Extract metadata from the ONNX model session.
    fn extract_metadata(session: &Session) -> Result<ModelMetadata> {
        let model_metadata = session.metadata().map_err(|e| {
            ImputationError::ModelLoadError(format!("Failed to get model metadata: {e}"))
        })?;

        let mut metadata_map: HashMap<String, String> = HashMap::new();
        for key in &METADATA_KEYS {
            if let Ok(Some(value)) = model_metadata.custom(key) {
                metadata_map.insert((*key).to_string(), value);
            }
        }
        ModelMetadata::from_onnx_metadata(&metadata_map)
    }

    /// Resolve graph input names: the expected names when the graph declares
    /// them, declaration order otherwise.
    fn resolve_input_names(session: &Session) -> Result<Vec<String>> {
        let declared: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        if declared.len() != INPUT_NAMES.len() {
            return Err(ImputationError::ModelLoadError(format!(
                "Checkpoint declares {} inputs, expected {} ({})",
                declared.len(),
                INPUT_NAMES.len(),
                INPUT_NAMES.join(", ")
            )));
        }
        if INPUT_NAMES.iter().all(|n| declared.iter().any(|d| d == n)) {
            return Ok(INPUT_NAMES.iter().map(|s| (*s).to_string()).collect());
        }
        Ok(declared)
    }

    /// Validate the checkpoint against the run configuration, the backing
    /// dataset and the prompt setup.
    ///
    /// # Errors
    ///
    /// Returns a `ModelLoadError` describing the first mismatch.
    pub fn check_compatibility(
        &self,
        genome: crate::genome::Genome,
        bin_size: crate::genome::BinSize,
        dataset_seq_len: usize,
        prompt_dim: usize,
    ) -> Result<()> {
        if self.metadata.genome != genome {
            return Err(ImputationError::ModelLoadError(format!(
                "Checkpoint was trained on {} but the run expects {genome}",
                self.metadata.genome
            )));
        }
        if self.metadata.bin_size != bin_size {
            return Err(ImputationError::ModelLoadError(format!(
                "Checkpoint uses {} bins but the run expects {bin_size}",
                self.metadata.bin_size
            )));
        }
        if self.metadata.seq_len != dataset_seq_len {
            return Err(ImputationError::ModelLoadError(format!(
                "Checkpoint expects {} tokens per region but the dataset provides {}",
                self.metadata.seq_len, dataset_seq_len
            )));
        }
        if self.metadata.prompt_dim != prompt_dim {
            return Err(ImputationError::ModelLoadError(format!(
                "Checkpoint expects prompt dimension {} but the run is configured for {}",
                self.metadata.prompt_dim, prompt_dim
            )));
        }
        Ok(())
    }

    /// Warm up the model with a single zero batch.
    ///
    /// Pre-allocates memory and finalizes graph optimization; called lazily
    /// before the first real batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the warmup inference fails.
    pub fn warmup(&mut self) -> Result<()> {
        if self.warmed_up {
            return Ok(());
        }
        let input_ids = Array2::<i64>::zeros((1, self.metadata.seq_len));
        let prompt = Array2::<f32>::zeros((1, self.metadata.prompt_dim));
        let _ = self.run_batch(&input_ids, &prompt, &prompt)?;
        self.warmed_up = true;
        Ok(())
    }

    /// Run one batch and return imputed probabilities, one per row.
    ///
    /// # Errors
    ///
    /// Returns an `InferenceError` if shapes disagree or the session fails.
    pub fn predict_batch(
        &mut self,
        input_ids: &Array2<i64>,
        celltype_prompts: &Array2<f32>,
        regulator_prompts: &Array2<f32>,
    ) -> Result<Vec<f32>> {
        if !self.warmed_up {
            self.warmup()?;
        }
        let batch = input_ids.nrows();
        if celltype_prompts.nrows() != batch || regulator_prompts.nrows() != batch {
            return Err(ImputationError::InferenceError(format!(
                "Batch size mismatch: {} token rows, {} cell-type prompts, {} regulator prompts",
                batch,
                celltype_prompts.nrows(),
                regulator_prompts.nrows()
            )));
        }
        self.run_batch(input_ids, celltype_prompts, regulator_prompts)
    }

    /// Run the ONNX session on prepared batch tensors.
    fn run_batch(
        &mut self,
        input_ids: &Array2<i64>,
        celltype_prompts: &Array2<f32>,
        regulator_prompts: &Array2<f32>,
    ) -> Result<Vec<f32>> {
        let batch = input_ids.nrows();

        let ids = input_ids.as_standard_layout();
        let celltype = celltype_prompts.as_standard_layout();
        let regulator = regulator_prompts.as_standard_layout();

        let ids_tensor = TensorRef::from_array_view(&ids).map_err(|e| {
            ImputationError::InferenceError(format!("Failed to create input tensor: {e}"))
        })?;
        let celltype_tensor = TensorRef::from_array_view(&celltype).map_err(|e| {
            ImputationError::InferenceError(format!("Failed to create prompt tensor: {e}"))
        })?;
        let regulator_tensor = TensorRef::from_array_view(&regulator).map_err(|e| {
            ImputationError::InferenceError(format!("Failed to create prompt tensor: {e}"))
        })?;

        let inputs = ort::inputs![
            &self.input_names[0] => ids_tensor,
            &self.input_names[1] => celltype_tensor,
            &self.input_names[2] => regulator_tensor,
        ];

        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| ImputationError::InferenceError(format!("Inference failed: {e}")))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            ImputationError::InferenceError(format!("Output '{}' not found", self.output_name))
        })?;
        let (_shape, data) = output.try_extract_tensor::<f32>().map_err(|e| {
            ImputationError::InferenceError(format!("Failed to extract output: {e}"))
        })?;

        if data.len() != batch {
            return Err(ImputationError::InferenceError(format!(
                "Checkpoint returned {} logits for a batch of {batch}",
                data.len()
            )));
        }

        Ok(data.iter().map(|&logit| sigmoid(logit)).collect())
    }

    /// Checkpoint metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Regulator tokens per region the checkpoint expects.
    #[must_use]
    pub const fn seq_len(&self) -> usize {
        self.metadata.seq_len
    }

    /// Prompt dimension the checkpoint expects.
    #[must_use]
    pub const fn prompt_dim(&self) -> usize {
        self.metadata.prompt_dim
    }
}

impl std::fmt::Debug for ChromBert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromBert")
            .field("genome", &self.metadata.genome)
            .field("bin_size", &self.metadata.bin_size)
            .field("seq_len", &self.metadata.seq_len)
            .field("prompt_dim", &self.metadata.prompt_dim)
            .finish()
    }
}

/// Logistic function mapping a logit to a probability.
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
