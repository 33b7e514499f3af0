//! ML Inference Server Library
//!
//! HTTP front-end for a Flan-T5 text generator and a MiniLM sentence embedder

pub mod models;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod protocol;
pub mod server;

// Re-exports
pub use models::{Embedding, InferenceError, InferenceResult, ModelContext};
pub use protocol::{TestEmbeddingsRequest, TestLlmRequest};
pub use server::{start_hyper_http_server, ServerConfig, ServerState};
