//! Configuration sections for the models
//!
//! These are embedded in the `[models]`, `[onnx]`, `[generation]` and
//! `[embedding]` tables of the server's `config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::generator::GenerationParams;
use crate::models::sampling::SamplingParams;
use crate::models::{InferenceError, InferenceResult};

/// Where the model files live and where to fetch them from when missing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory holding `encoder_model.onnx`, `decoder_model.onnx` and `tokenizer.json`
    pub generator_dir: PathBuf,
    /// Hugging Face repo with an ONNX export of the generator
    pub generator_repo: String,
    /// Directory holding `model.onnx` and `tokenizer.json`
    pub embedder_dir: PathBuf,
    /// Hugging Face repo with an ONNX export of the sentence encoder
    pub embedder_repo: String,
    /// Never download, fail if a file is missing locally
    pub offline: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            generator_dir: PathBuf::from("ml_models/onnx/flan-t5-base"),
            generator_repo: "Xenova/flan-t5-base".to_string(),
            embedder_dir: PathBuf::from("ml_models/onnx/all-MiniLM-L6-v2"),
            embedder_repo: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            offline: false,
        }
    }
}

/// ONNX Runtime session settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OnnxRuntimeConfig {
    /// Thread pool size for a single inference call
    pub intra_threads: usize,
    /// Graph optimization level, 0 (disabled) to 3 (all)
    pub optimization_level: u8,
}

impl Default for OnnxRuntimeConfig {
    fn default() -> Self {
        Self {
            intra_threads: 4,
            optimization_level: 3,
        }
    }
}

/// Fixed parameters of the text generation endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Prompts longer than this many tokens are truncated
    pub max_input_tokens: usize,
    pub max_new_tokens: usize,
    pub temperature: f32,
    /// Keep only the k most likely tokens when sampling, 0 keeps all
    pub top_k: usize,
    pub do_sample: bool,
    /// Pins the sampler when set
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: 512,
            max_new_tokens: 100,
            temperature: 0.7,
            top_k: 50,
            do_sample: true,
            seed: None,
        }
    }
}

impl GenerationConfig {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_new_tokens: self.max_new_tokens,
            sampling: SamplingParams {
                do_sample: self.do_sample,
                temperature: self.temperature,
                top_k: self.top_k,
            },
            seed: self.seed,
        }
    }

    pub fn validate(&self) -> InferenceResult<()> {
        if self.max_input_tokens == 0 {
            return Err(InferenceError::ConfigError {
                message: "generation.max_input_tokens must be at least 1".to_string(),
            });
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(InferenceError::ConfigError {
                message: format!(
                    "generation.temperature must be a non-negative number (got {})",
                    self.temperature
                ),
            });
        }
        Ok(())
    }
}

/// Batching and truncation of the embedding path
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub batch_size: usize,
    /// Texts longer than this many tokens are truncated
    pub max_seq_length: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::models::embedder::DEFAULT_BATCH_SIZE,
            max_seq_length: 128,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> InferenceResult<()> {
        if self.batch_size == 0 {
            return Err(InferenceError::ConfigError {
                message: "embedding.batch_size must be at least 1".to_string(),
            });
        }
        if self.max_seq_length == 0 {
            return Err(InferenceError::ConfigError {
                message: "embedding.max_seq_length must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
