//! HTTP REST API Protocol
//!
//! JSON bodies of the inference endpoints. The test endpoints default every
//! field, so a missing or empty body is a valid request. The pipeline
//! endpoints (`/search-chunks`, `/compile-rubric`, `/extract-evidence`) have
//! required fields.

use serde::{Deserialize, Serialize};

use crate::models::rubric::Requirement;

pub const DEFAULT_PROMPT: &str = "Hello, how are you?";
pub const SERVICE_NAME: &str = "ml-inference";
/// Leading values of the first vector echoed by `/test-embeddings`
pub const SAMPLE_EMBEDDING_LEN: usize = 5;
pub const DEFAULT_SEARCH_K: usize = 3;

/// POST /test-llm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLlmRequest {
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Pins the sampler for reproducible output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

impl Default for TestLlmRequest {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLlmResponse {
    pub prompt: String,
    pub response: String,
}

/// POST /test-embeddings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestEmbeddingsRequest {
    #[serde(default = "default_texts")]
    pub texts: Vec<String>,
}

fn default_texts() -> Vec<String> {
    vec!["Hello world".to_string(), "Test sentence".to_string()]
}

impl Default for TestEmbeddingsRequest {
    fn default() -> Self {
        Self {
            texts: default_texts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestEmbeddingsResponse {
    pub texts: Vec<String>,
    /// `[number of texts, dimension]`
    pub embeddings_shape: [usize; 2],
    pub dimension: usize,
    pub sample_embedding: Vec<f32>,
}

/// POST /embed-chunks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedChunksRequest {
    #[serde(default)]
    pub chunks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedChunksResponse {
    pub embeddings: Vec<Vec<f32>>,
    pub dimension: usize,
    pub count: usize,
}

/// POST /search-chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchChunksRequest {
    pub query: String,

    /// Previously computed chunk embeddings
    pub embeddings: Vec<Vec<f32>>,

    /// Echoed back with each hit, matched by position
    #[serde(default)]
    pub chunks_metadata: Vec<serde_json::Value>,

    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    DEFAULT_SEARCH_K
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// 1-based
    pub rank: usize,
    pub index: usize,
    pub score: f32,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchChunksResponse {
    pub results: Vec<SearchResult>,
}

/// POST /compile-rubric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileRubricRequest {
    pub assignment_text: String,

    /// Pins the generator when the assignment has no requirement list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileRubricResponse {
    pub success: bool,
    pub rubric: Vec<Requirement>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// POST /extract-evidence, answered with an `Evidence`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractEvidenceRequest {
    pub requirement: String,

    /// Texts of the chunks retrieved for the requirement
    #[serde(default)]
    pub chunks: Vec<String>,
}

/// HTTP Error Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    /// Error message
    pub error: String,

    /// Error code (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Additional details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HttpErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            details: None,
        }
    }

    /// Create error with code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Create error with details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn invalid_json(details: impl Into<String>) -> Self {
        Self::new("Invalid JSON request body")
            .with_code("INVALID_JSON")
            .with_details(details)
    }

    pub fn invalid_input(details: impl Into<String>) -> Self {
        Self::new("Invalid input")
            .with_code("INVALID_INPUT")
            .with_details(details)
    }

    /// Create model not ready error
    pub fn model_not_ready() -> Self {
        Self::new("Models are still loading, please try again later").with_code("MODEL_NOT_READY")
    }

    /// Create internal error
    pub fn internal_error(details: impl Into<String>) -> Self {
        Self::new("Internal server error occurred during inference")
            .with_code("INTERNAL_ERROR")
            .with_details(details)
    }

    pub fn not_found() -> Self {
        Self::new("Not Found")
    }
}

/// GET /health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub models_loaded: bool,
}

impl HealthResponse {
    pub fn healthy(models_loaded: bool) -> Self {
        Self {
            status: "healthy".to_string(),
            service: SERVICE_NAME.to_string(),
            models_loaded,
        }
    }
}
