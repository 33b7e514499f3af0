//! Flan-T5 encoder-decoder over ONNX Runtime
//!
//! Expects the Optimum/Transformers.js export layout: `encoder_model.onnx`
//! (`input_ids`, `attention_mask` → `last_hidden_state`) and
//! `decoder_model.onnx` (`input_ids`, `encoder_attention_mask`,
//! `encoder_hidden_states` → `logits`). The decoder is rerun over the whole
//! prefix every step; there is no key/value cache.

use ndarray::{Array2, Array3};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::models::{
    EncoderState, GenerationConfig, InferenceError, InferenceResult, ModelsConfig,
    OnnxRuntimeConfig, Seq2SeqModel,
};
use crate::onnx::{build_session, load_tokenizer, resolve_model_file};

pub struct OnnxSeq2SeqEngine {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    tokenizer: Tokenizer,
    model_name: String,
    decoder_start_token_id: u32,
    eos_token_id: u32,
}

impl std::fmt::Debug for OnnxSeq2SeqEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxSeq2SeqEngine")
            .field("model_name", &self.model_name)
            .field("decoder_start_token_id", &self.decoder_start_token_id)
            .field("eos_token_id", &self.eos_token_id)
            .finish_non_exhaustive()
    }
}

fn inference_error(context: &str, e: impl std::fmt::Display) -> InferenceError {
    InferenceError::InferenceFailed {
        error: format!("{}: {}", context, e),
    }
}

fn lock_poisoned(name: &str) -> InferenceError {
    InferenceError::InferenceFailed {
        error: format!("{} session lock poisoned", name),
    }
}

impl OnnxSeq2SeqEngine {
    pub fn load(
        models: &ModelsConfig,
        generation: &GenerationConfig,
        runtime: &OnnxRuntimeConfig,
    ) -> InferenceResult<Self> {
        let model_name = models.generator_repo.as_str();
        let resolve = |file_name: &str, remote_path: &str| {
            resolve_model_file(
                model_name,
                &models.generator_dir,
                file_name,
                &models.generator_repo,
                remote_path,
                models.offline,
            )
        };

        let encoder_path = resolve("encoder_model.onnx", "onnx/encoder_model.onnx")?;
        let decoder_path = resolve("decoder_model.onnx", "onnx/decoder_model.onnx")?;
        let tokenizer_path = resolve("tokenizer.json", "tokenizer.json")?;

        Self::from_files(
            model_name,
            &encoder_path,
            &decoder_path,
            &tokenizer_path,
            generation.max_input_tokens,
            runtime,
        )
    }

    pub fn from_files<P: AsRef<Path>>(
        model_name: &str,
        encoder_path: P,
        decoder_path: P,
        tokenizer_path: P,
        max_input_tokens: usize,
        runtime: &OnnxRuntimeConfig,
    ) -> InferenceResult<Self> {
        let mut tokenizer = load_tokenizer(model_name, tokenizer_path.as_ref())?;
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_input_tokens,
                ..Default::default()
            }))
            .map_err(|e| InferenceError::ModelLoadError {
                model_name: model_name.to_string(),
                error: format!("Failed to configure truncation: {}", e),
            })?;

        // T5 starts decoding from the pad token
        let decoder_start_token_id = tokenizer.token_to_id("<pad>").unwrap_or(0);
        let eos_token_id = tokenizer.token_to_id("</s>").unwrap_or(1);
        debug!(
            "Special tokens - decoder start: {}, EOS: {}",
            decoder_start_token_id, eos_token_id
        );

        let encoder = build_session(model_name, encoder_path.as_ref(), runtime)?;
        let decoder = build_session(model_name, decoder_path.as_ref(), runtime)?;

        info!(
            "ONNX seq2seq model {} ready (vocabulary {})",
            model_name,
            tokenizer.get_vocab_size(true)
        );

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            tokenizer,
            model_name: model_name.to_string(),
            decoder_start_token_id,
            eos_token_id,
        })
    }
}

fn ids_tensor(ids: &[u32]) -> InferenceResult<Tensor<i64>> {
    let values: Vec<i64> = ids.iter().map(|&id| id as i64).collect();
    Tensor::from_array(([1i64, values.len() as i64], values))
        .map_err(|e| inference_error("Failed to create input_ids tensor", e))
}

impl Seq2SeqModel for OnnxSeq2SeqEngine {
    fn tokenize(&self, prompt: &str) -> InferenceResult<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| InferenceError::TokenizationFailed {
                error: e.to_string(),
            })?;

        let mut ids = encoding.get_ids().to_vec();
        if ids.is_empty() {
            ids.push(self.eos_token_id);
        }
        Ok(ids)
    }

    fn encode(&self, input_ids: &[u32]) -> InferenceResult<EncoderState> {
        let seq_len = input_ids.len();
        let attention_mask = Array2::<i64>::ones((1, seq_len));

        let input_ids_tensor = ids_tensor(input_ids)?;
        let attention_mask_tensor = Tensor::from_array(([1i64, seq_len as i64], vec![1i64; seq_len]))
            .map_err(|e| inference_error("Failed to create attention_mask tensor", e))?;

        let mut session = self.encoder.lock().map_err(|_| lock_poisoned("Encoder"))?;
        let outputs = session
            .run(vec![
                ("input_ids", input_ids_tensor),
                ("attention_mask", attention_mask_tensor),
            ])
            .map_err(|e| inference_error("Encoder inference failed", e))?;

        let output = outputs
            .get("last_hidden_state")
            .ok_or_else(|| inference_error("Encoder output missing", "last_hidden_state"))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| inference_error("Failed to extract encoder output", e))?;

        let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
        if dims.len() != 3 {
            return Err(inference_error(
                "Unexpected encoder output",
                format!("{}D tensor", dims.len()),
            ));
        }
        let hidden_states = Array3::from_shape_vec((dims[0], dims[1], dims[2]), data.to_vec())?;

        Ok(EncoderState {
            hidden_states,
            attention_mask,
        })
    }

    fn next_token_logits(
        &self,
        encoder: &EncoderState,
        decoder_input_ids: &[u32],
    ) -> InferenceResult<Vec<f32>> {
        let (batch, seq_len, hidden) = encoder.hidden_states.dim();
        let hidden_tensor = Tensor::from_array((
            [batch as i64, seq_len as i64, hidden as i64],
            encoder.hidden_states.iter().copied().collect::<Vec<f32>>(),
        ))
        .map_err(|e| inference_error("Failed to create encoder_hidden_states tensor", e))?;
        let mask_tensor = Tensor::from_array((
            [batch as i64, seq_len as i64],
            encoder.attention_mask.iter().copied().collect::<Vec<i64>>(),
        ))
        .map_err(|e| inference_error("Failed to create encoder_attention_mask tensor", e))?;
        let decoder_ids_tensor = ids_tensor(decoder_input_ids)?;

        let mut session = self.decoder.lock().map_err(|_| lock_poisoned("Decoder"))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => decoder_ids_tensor,
                "encoder_attention_mask" => mask_tensor,
                "encoder_hidden_states" => hidden_tensor
            ])
            .map_err(|e| inference_error("Decoder inference failed", e))?;

        let output = outputs
            .get("logits")
            .ok_or_else(|| inference_error("Decoder output missing", "logits"))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| inference_error("Failed to extract logits", e))?;

        // [1, decoder_len, vocab]
        let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
        if dims.len() != 3 || dims[1] == 0 {
            return Err(inference_error("Unexpected logits shape", format!("{:?}", dims)));
        }
        let vocab = dims[2];
        let last = (dims[1] - 1) * vocab;

        Ok(data[last..last + vocab].to_vec())
    }

    fn decode(&self, token_ids: &[u32]) -> InferenceResult<String> {
        self.tokenizer
            .decode(token_ids, true)
            .map_err(|e| InferenceError::TokenizationFailed {
                error: format!("Decoding failed: {}", e),
            })
    }

    fn decoder_start_token_id(&self) -> u32 {
        self.decoder_start_token_id
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenerationParams, TextGenerator};
    use std::sync::Arc;

    const MODEL_DIR: &str = "ml_models/onnx/flan-t5-base";

    fn load_local() -> InferenceResult<OnnxSeq2SeqEngine> {
        let dir = Path::new(MODEL_DIR);
        OnnxSeq2SeqEngine::from_files(
            "flan-t5-base",
            dir.join("encoder_model.onnx"),
            dir.join("decoder_model.onnx"),
            dir.join("tokenizer.json"),
            512,
            &OnnxRuntimeConfig::default(),
        )
    }

    #[test]
    fn test_missing_files_error() {
        let result = OnnxSeq2SeqEngine::from_files(
            "flan-t5-base",
            "/nonexistent/encoder_model.onnx",
            "/nonexistent/decoder_model.onnx",
            "/nonexistent/tokenizer.json",
            512,
            &OnnxRuntimeConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    #[ignore] // Only run if model files are downloaded
    fn test_flan_t5_generation() {
        let engine = load_local().unwrap();
        assert_eq!(engine.eos_token_id(), 1);
        assert_eq!(engine.decoder_start_token_id(), 0);

        let generator = TextGenerator::new(Arc::new(engine), GenerationParams::default());
        let response = generator.generate("Hello, how are you?", None).unwrap();
        assert!(!response.is_empty());
    }

    #[test]
    #[ignore] // Only run if model files are downloaded
    fn test_long_prompt_truncated() {
        let engine = load_local().unwrap();
        let prompt = "word ".repeat(2000);
        assert!(engine.tokenize(&prompt).unwrap().len() <= 512);
    }
}
