//! # ONNX Sentence Encoder
//!
//! Runs the all-MiniLM-L6-v2 encoder through ONNX Runtime and exposes it as
//! an [`EmbeddingBackend`]: batched tokenization with padding to the longest
//! text, and raw `last_hidden_state` token vectors. Pooling and
//! normalization happen in [`crate::models::pooling`].
//!
//! ## Usage
//!
//! ```ignore
//! let engine = OnnxEmbeddingEngine::from_files(
//!     "all-MiniLM-L6-v2",
//!     "ml_models/onnx/all-MiniLM-L6-v2/model.onnx",
//!     "ml_models/onnx/all-MiniLM-L6-v2/tokenizer.json",
//!     128,
//!     &OnnxRuntimeConfig::default(),
//! )?;
//! assert_eq!(engine.dimension(), 384);
//! ```

use ndarray::Array3;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info, instrument};

use crate::models::{
    EmbeddingBackend, EmbeddingConfig, InferenceError, InferenceResult, ModelsConfig,
    OnnxRuntimeConfig, TokenBatch,
};
use crate::onnx::{build_session, load_tokenizer, resolve_model_file};

/// ONNX-based sentence encoder
pub struct OnnxEmbeddingEngine {
    /// `run` needs `&mut Session`, everything else is read-only
    session: Mutex<Session>,
    /// Tokenizer configured for batch-longest padding and truncation
    tokenizer: Tokenizer,
    model_name: String,
    /// Hidden size, probed once at load
    dimension: usize,
    /// Whether the export declares a `token_type_ids` input
    uses_token_type_ids: bool,
}

impl std::fmt::Debug for OnnxEmbeddingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingEngine")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("uses_token_type_ids", &self.uses_token_type_ids)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingEngine {
    /// Resolve the model files from configuration and load them.
    pub fn load(
        models: &ModelsConfig,
        embedding: &EmbeddingConfig,
        runtime: &OnnxRuntimeConfig,
    ) -> InferenceResult<Self> {
        let model_name = models.embedder_repo.as_str();
        let resolve = |file_name: &str, remote_path: &str| {
            resolve_model_file(
                model_name,
                &models.embedder_dir,
                file_name,
                &models.embedder_repo,
                remote_path,
                models.offline,
            )
        };

        let model_path = resolve("model.onnx", "onnx/model.onnx")?;
        let tokenizer_path = resolve("tokenizer.json", "tokenizer.json")?;

        Self::from_files(
            model_name,
            &model_path,
            &tokenizer_path,
            embedding.max_seq_length,
            runtime,
        )
    }

    /// Load the encoder from an ONNX file and a `tokenizer.json`.
    ///
    /// Runs one probe inference to learn the hidden size and to check that
    /// the model emits `[batch, sequence, hidden]` token vectors.
    pub fn from_files<P: AsRef<Path>>(
        model_name: &str,
        model_path: P,
        tokenizer_path: P,
        max_seq_length: usize,
        runtime: &OnnxRuntimeConfig,
    ) -> InferenceResult<Self> {
        info!(
            "Initializing ONNX sentence encoder {} with {} threads",
            model_name, runtime.intra_threads
        );

        let session = build_session(model_name, model_path.as_ref(), runtime)?;
        let uses_token_type_ids = session.inputs.iter().any(|i| i.name == "token_type_ids");

        let mut tokenizer = load_tokenizer(model_name, tokenizer_path.as_ref())?;
        let padding = match tokenizer.get_padding() {
            Some(existing) => PaddingParams {
                strategy: PaddingStrategy::BatchLongest,
                ..existing.clone()
            },
            None => PaddingParams {
                strategy: PaddingStrategy::BatchLongest,
                ..Default::default()
            },
        };
        tokenizer.with_padding(Some(padding));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_seq_length,
                ..Default::default()
            }))
            .map_err(|e| InferenceError::ModelLoadError {
                model_name: model_name.to_string(),
                error: format!("Failed to configure truncation: {}", e),
            })?;

        let mut engine = Self {
            session: Mutex::new(session),
            tokenizer,
            model_name: model_name.to_string(),
            dimension: 0,
            uses_token_type_ids,
        };

        let probe = engine.tokenize(&["dimension probe"])?;
        engine.dimension = engine.forward(&probe)?.dim().2;
        info!(
            "ONNX sentence encoder {} ready, {} dimensions",
            model_name, engine.dimension
        );

        Ok(engine)
    }
}

impl EmbeddingBackend for OnnxEmbeddingEngine {
    fn tokenize(&self, texts: &[&str]) -> InferenceResult<TokenBatch> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| InferenceError::TokenizationFailed {
                error: e.to_string(),
            })?;

        let mut ids = Vec::with_capacity(encodings.len());
        let mut masks = Vec::with_capacity(encodings.len());
        let mut type_ids = Vec::with_capacity(encodings.len());
        for encoding in encodings {
            ids.push(encoding.get_ids().to_vec());
            masks.push(encoding.get_attention_mask().to_vec());
            type_ids.push(encoding.get_type_ids().to_vec());
        }

        TokenBatch::from_rows(ids, masks, type_ids)
    }

    #[instrument(skip(self, batch), fields(batch_size = batch.batch_size(), seq_len = batch.seq_len()))]
    fn forward(&self, batch: &TokenBatch) -> InferenceResult<Array3<f32>> {
        let shape = [batch.batch_size() as i64, batch.seq_len() as i64];
        let tensor = |values: &ndarray::Array2<i64>| {
            Tensor::from_array((shape, values.iter().copied().collect::<Vec<i64>>())).map_err(|e| {
                InferenceError::InferenceFailed {
                    error: format!("Failed to create input tensor: {}", e),
                }
            })
        };

        let mut inputs = vec![
            ("input_ids", tensor(&batch.input_ids)?),
            ("attention_mask", tensor(&batch.attention_mask)?),
        ];
        if self.uses_token_type_ids {
            inputs.push(("token_type_ids", tensor(&batch.token_type_ids)?));
        }

        let mut session = self.session.lock().map_err(|_| InferenceError::InferenceFailed {
            error: "Encoder session lock poisoned".to_string(),
        })?;

        let outputs = session.run(inputs).map_err(|e| InferenceError::InferenceFailed {
            error: format!("ONNX inference failed: {}", e),
        })?;

        let output = outputs
            .get("last_hidden_state")
            .ok_or_else(|| InferenceError::InferenceFailed {
                error: "Encoder has no last_hidden_state output".to_string(),
            })?;
        let (output_shape, data) =
            output
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::InferenceFailed {
                    error: format!("Failed to extract output tensor: {}", e),
                })?;

        let dims: Vec<usize> = output_shape.iter().map(|&x| x as usize).collect();
        if dims.len() != 3 {
            return Err(InferenceError::InferenceFailed {
                error: format!("Expected 3D output tensor, got {}D", dims.len()),
            });
        }
        debug!("Encoder output shape: {:?}", dims);

        Ok(Array3::from_shape_vec((dims[0], dims[1], dims[2]), data.to_vec())?)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
