//! Text generation adapter for encoder-decoder models
//!
//! The prompt is encoded once, then the decoder is run autoregressively from
//! the decoder-start token until end-of-sequence or the token budget.

use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::debug;

use crate::models::sampling::{sample_token, SamplingParams};
use crate::models::InferenceResult;

/// Encoder output kept for the whole decoding loop
#[derive(Debug, Clone)]
pub struct EncoderState {
    /// `[1, sequence, hidden]`
    pub hidden_states: Array3<f32>,
    /// `[1, sequence]`
    pub attention_mask: Array2<i64>,
}

/// Tokenizer, encoder and decoder of a sequence-to-sequence model
pub trait Seq2SeqModel: Send + Sync {
    /// Token ids of the prompt, truncated to the model's input budget.
    fn tokenize(&self, prompt: &str) -> InferenceResult<Vec<u32>>;

    fn encode(&self, input_ids: &[u32]) -> InferenceResult<EncoderState>;

    /// Logits over the vocabulary for the position after `decoder_input_ids`.
    fn next_token_logits(
        &self,
        encoder: &EncoderState,
        decoder_input_ids: &[u32],
    ) -> InferenceResult<Vec<f32>>;

    /// Text for `token_ids` with special tokens stripped.
    fn decode(&self, token_ids: &[u32]) -> InferenceResult<String>;

    fn decoder_start_token_id(&self) -> u32;

    fn eos_token_id(&self) -> u32;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub sampling: SamplingParams,
    /// Default seed, used when the caller doesn't pass one
    pub seed: Option<u64>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
            sampling: SamplingParams::default(),
            seed: None,
        }
    }
}

#[derive(Clone)]
pub struct TextGenerator {
    model: Arc<dyn Seq2SeqModel>,
    params: GenerationParams,
}

impl std::fmt::Debug for TextGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextGenerator")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl TextGenerator {
    pub fn new(model: Arc<dyn Seq2SeqModel>, params: GenerationParams) -> Self {
        Self { model, params }
    }

    /// Generate a reply to `prompt`.
    ///
    /// `seed` overrides the configured seed. With neither, the sampler is
    /// seeded from OS entropy and the output varies between calls.
    pub fn generate(&self, prompt: &str, seed: Option<u64>) -> InferenceResult<String> {
        let mut rng = match seed.or(self.params.seed) {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.generate_with_rng(prompt, &mut rng)
    }

    pub fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        prompt: &str,
        rng: &mut R,
    ) -> InferenceResult<String> {
        let input_ids = self.model.tokenize(prompt)?;
        debug!("Prompt tokenized to {} tokens", input_ids.len());

        let encoder = self.model.encode(&input_ids)?;

        let eos = self.model.eos_token_id();
        let mut decoder_ids = vec![self.model.decoder_start_token_id()];

        for _ in 0..self.params.max_new_tokens {
            let logits = self.model.next_token_logits(&encoder, &decoder_ids)?;
            let next_token = sample_token(&logits, &self.params.sampling, rng)?;
            if next_token == eos {
                break;
            }
            decoder_ids.push(next_token);
        }

        debug!("Generated {} tokens", decoder_ids.len() - 1);

        let text = self.model.decode(&decoder_ids[1..])?;
        Ok(text.trim().to_string())
    }
}
