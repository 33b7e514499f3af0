//! ONNX Runtime backends
//!
//! Session construction, tokenizer loading and model file resolution shared
//! by the sentence encoder and the seq2seq generator.

pub mod embedding_engine;
pub mod seq2seq_engine;

pub use embedding_engine::OnnxEmbeddingEngine;
pub use seq2seq_engine::OnnxSeq2SeqEngine;

use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::models::{InferenceError, InferenceResult, OnnxRuntimeConfig};

fn optimization_level(level: u8) -> GraphOptimizationLevel {
    match level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}

pub(crate) fn build_session(
    model_name: &str,
    model_path: &Path,
    runtime: &OnnxRuntimeConfig,
) -> InferenceResult<Session> {
    let load_error = |e: String| InferenceError::ModelLoadError {
        model_name: model_name.to_string(),
        error: format!("Failed to load ONNX model {}: {}", model_path.display(), e),
    };

    let session = Session::builder()
        .map_err(|e| load_error(e.to_string()))?
        .with_optimization_level(optimization_level(runtime.optimization_level))
        .map_err(|e| load_error(e.to_string()))?
        .with_intra_threads(runtime.intra_threads)
        .map_err(|e| load_error(e.to_string()))?
        .commit_from_file(model_path)
        .map_err(|e| load_error(e.to_string()))?;

    let input_names: Vec<_> = session.inputs.iter().map(|i| &i.name).collect();
    debug!("{} inputs: {:?}", model_path.display(), input_names);

    Ok(session)
}

pub(crate) fn load_tokenizer(model_name: &str, tokenizer_path: &Path) -> InferenceResult<Tokenizer> {
    Tokenizer::from_file(tokenizer_path).map_err(|e| InferenceError::ModelLoadError {
        model_name: model_name.to_string(),
        error: format!("Failed to load tokenizer {}: {}", tokenizer_path.display(), e),
    })
}

/// Find `file_name` in `dir`, or fetch `remote_path` from the Hugging Face
/// repo when it's missing and downloads are allowed.
pub(crate) fn resolve_model_file(
    model_name: &str,
    dir: &Path,
    file_name: &str,
    repo: &str,
    remote_path: &str,
    offline: bool,
) -> InferenceResult<PathBuf> {
    let local = dir.join(file_name);
    if local.exists() {
        return Ok(local);
    }

    if offline {
        return Err(InferenceError::ModelLoadError {
            model_name: model_name.to_string(),
            error: format!("{} not found and downloads are disabled", local.display()),
        });
    }

    info!("⬇️  {} not found locally, fetching {} from {}", file_name, remote_path, repo);
    let api = hf_hub::api::sync::Api::new()?;
    let path = api.model(repo.to_string()).get(remote_path)?;
    Ok(path)
}
