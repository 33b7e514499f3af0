//! Model-side building blocks: pooling, batching, generation and the
//! immutable context that owns the loaded handles.

pub mod config;
pub mod context;
pub mod embedder;
pub mod evidence;
pub mod generator;
pub mod pooling;
pub mod rubric;
pub mod sampling;
pub mod search;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use config::{EmbeddingConfig, GenerationConfig, ModelsConfig, OnnxRuntimeConfig};
pub use context::ModelContext;
pub use embedder::{EmbeddingBackend, SentenceEmbedder, TokenBatch};
pub use evidence::{Evidence, EvidenceStatus};
pub use generator::{EncoderState, GenerationParams, Seq2SeqModel, TextGenerator};
pub use rubric::{CompiledRubric, Requirement};
pub use sampling::SamplingParams;

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Result type for model operations
pub type InferenceResult<T> = Result<T, InferenceError>;

/// Errors that can occur while loading or running models
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Model loading failed: {model_name} - {error}")]
    ModelLoadError { model_name: String, error: String },

    #[error("Model download failed: {error}")]
    DownloadFailed { error: String },

    #[error("Tokenization failed: {error}")]
    TokenizationFailed { error: String },

    #[error("Inference failed: {error}")]
    InferenceFailed { error: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Array shape error: {error}")]
    ShapeError { error: ndarray::ShapeError },

    #[error("IO error: {error}")]
    IoError { error: std::io::Error },

    #[error("TOML parsing error: {error}")]
    TomlError { error: toml::de::Error },
}

impl InferenceError {
    /// Whether the caller can fix the request and retry.
    pub fn is_client_error(&self) -> bool {
        matches!(self, InferenceError::InvalidInput { .. })
    }
}

impl From<std::io::Error> for InferenceError {
    fn from(error: std::io::Error) -> Self {
        InferenceError::IoError { error }
    }
}

impl From<toml::de::Error> for InferenceError {
    fn from(error: toml::de::Error) -> Self {
        InferenceError::TomlError { error }
    }
}

impl From<ndarray::ShapeError> for InferenceError {
    fn from(error: ndarray::ShapeError) -> Self {
        InferenceError::ShapeError { error }
    }
}

impl From<hf_hub::api::sync::ApiError> for InferenceError {
    fn from(error: hf_hub::api::sync::ApiError) -> Self {
        InferenceError::DownloadFailed { error: error.to_string() }
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for InferenceError {
    fn from(error: ort::Error) -> Self {
        InferenceError::InferenceFailed { error: error.to_string() }
    }
}
