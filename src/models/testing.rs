//! Deterministic in-process models for tests

use ndarray::{Array2, Array3};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::models::embedder::{EmbeddingBackend, SentenceEmbedder, TokenBatch};
use crate::models::generator::{EncoderState, GenerationParams, Seq2SeqModel, TextGenerator};
use crate::models::{InferenceError, InferenceResult, ModelContext};

pub const FAKE_DIMENSION: usize = 8;

pub fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Whitespace tokenizer with a per-token lookup "encoder".
///
/// Every token vector depends only on its own id, so results don't depend on
/// which other texts share the chunk. Padding positions carry large values
/// that only vanish if pooling honours the mask.
#[derive(Debug, Clone)]
pub struct FakeEncoder {
    max_length: usize,
}

impl Default for FakeEncoder {
    fn default() -> Self {
        Self { max_length: 128 }
    }
}

impl FakeEncoder {
    pub fn with_max_length(max_length: usize) -> Self {
        Self { max_length }
    }

    fn token_id(word: &str) -> u32 {
        word.bytes()
            .fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
            % 997
            + 1
    }
}

impl EmbeddingBackend for FakeEncoder {
    fn tokenize(&self, texts: &[&str]) -> InferenceResult<TokenBatch> {
        let rows: Vec<Vec<u32>> = texts
            .iter()
            .map(|text| {
                text.split_whitespace()
                    .take(self.max_length)
                    .map(Self::token_id)
                    .collect()
            })
            .collect();
        let longest = rows.iter().map(Vec::len).max().unwrap_or(0);

        let mut ids = Vec::with_capacity(rows.len());
        let mut masks = Vec::with_capacity(rows.len());
        for mut row in rows {
            let mut mask = vec![1u32; row.len()];
            row.resize(longest, 0);
            mask.resize(longest, 0);
            ids.push(row);
            masks.push(mask);
        }
        let type_ids = vec![vec![0u32; longest]; ids.len()];

        TokenBatch::from_rows(ids, masks, type_ids)
    }

    fn forward(&self, batch: &TokenBatch) -> InferenceResult<Array3<f32>> {
        let (rows, seq_len) = batch.input_ids.dim();
        Ok(Array3::from_shape_fn((rows, seq_len, FAKE_DIMENSION), |(b, s, d)| {
            let id = batch.input_ids[[b, s]];
            if batch.attention_mask[[b, s]] == 0 {
                100.0
            } else {
                ((id as usize * (d + 3)) % 13) as f32 + 1.0
            }
        }))
    }

    fn dimension(&self) -> usize {
        FAKE_DIMENSION
    }
}

pub const FAKE_START: u32 = 0;
pub const FAKE_EOS: u32 = 1;
pub const FAKE_VOCAB: usize = 12;

/// Seq2seq model that emits `answer_length` letters then stops.
///
/// Letters are sampled uniformly from the vocabulary, so the text depends on
/// the sampler's RNG while the length does not. One token per prompt
/// character, so a prompt longer than `max_input_tokens` gets truncated.
#[derive(Debug, Clone)]
pub struct FakeSeq2Seq {
    pub answer_length: usize,
    pub max_input_tokens: usize,
    /// Length of the last sequence passed to `encode`
    pub last_input_len: Arc<AtomicUsize>,
}

impl Default for FakeSeq2Seq {
    fn default() -> Self {
        Self {
            answer_length: 3,
            max_input_tokens: 512,
            last_input_len: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FakeSeq2Seq {
    pub fn last_input_len(&self) -> usize {
        self.last_input_len.load(Ordering::SeqCst)
    }
}

impl Seq2SeqModel for FakeSeq2Seq {
    fn tokenize(&self, prompt: &str) -> InferenceResult<Vec<u32>> {
        let mut ids: Vec<u32> = prompt
            .chars()
            .take(self.max_input_tokens - 1)
            .map(|c| 2 + (c as u32 % (FAKE_VOCAB as u32 - 2)))
            .collect();
        ids.push(FAKE_EOS);
        Ok(ids)
    }

    fn encode(&self, input_ids: &[u32]) -> InferenceResult<EncoderState> {
        if input_ids.is_empty() {
            return Err(InferenceError::InvalidInput {
                message: "empty encoder input".to_string(),
            });
        }
        self.last_input_len.store(input_ids.len(), Ordering::SeqCst);
        Ok(EncoderState {
            hidden_states: Array3::zeros((1, input_ids.len(), 4)),
            attention_mask: Array2::ones((1, input_ids.len())),
        })
    }

    fn next_token_logits(
        &self,
        _encoder: &EncoderState,
        decoder_input_ids: &[u32],
    ) -> InferenceResult<Vec<f32>> {
        let generated = decoder_input_ids.len() - 1;
        let mut logits = vec![0.0f32; FAKE_VOCAB];
        logits[FAKE_START as usize] = f32::NEG_INFINITY;
        if generated >= self.answer_length {
            logits.iter_mut().for_each(|l| *l = f32::NEG_INFINITY);
            logits[FAKE_EOS as usize] = 10.0;
        } else {
            logits[FAKE_EOS as usize] = f32::NEG_INFINITY;
        }
        Ok(logits)
    }

    fn decode(&self, token_ids: &[u32]) -> InferenceResult<String> {
        Ok(token_ids
            .iter()
            .filter(|&&id| id != FAKE_START && id != FAKE_EOS)
            .map(|&id| (b'a' + id as u8) as char)
            .collect())
    }

    fn decoder_start_token_id(&self) -> u32 {
        FAKE_START
    }

    fn eos_token_id(&self) -> u32 {
        FAKE_EOS
    }
}

/// Encoder whose forward pass always fails, as a broken session would.
#[derive(Debug, Clone, Default)]
pub struct FailingEncoder {
    inner: FakeEncoder,
}

impl EmbeddingBackend for FailingEncoder {
    fn tokenize(&self, texts: &[&str]) -> InferenceResult<TokenBatch> {
        self.inner.tokenize(texts)
    }

    fn forward(&self, _batch: &TokenBatch) -> InferenceResult<Array3<f32>> {
        Err(InferenceError::InferenceFailed {
            error: "encoder session crashed".to_string(),
        })
    }

    fn dimension(&self) -> usize {
        FAKE_DIMENSION
    }
}

/// Seq2seq model whose decoder always fails.
#[derive(Debug, Clone, Default)]
pub struct FailingSeq2Seq {
    inner: FakeSeq2Seq,
}

impl Seq2SeqModel for FailingSeq2Seq {
    fn tokenize(&self, prompt: &str) -> InferenceResult<Vec<u32>> {
        self.inner.tokenize(prompt)
    }

    fn encode(&self, input_ids: &[u32]) -> InferenceResult<EncoderState> {
        self.inner.encode(input_ids)
    }

    fn next_token_logits(
        &self,
        _encoder: &EncoderState,
        _decoder_input_ids: &[u32],
    ) -> InferenceResult<Vec<f32>> {
        Err(InferenceError::InferenceFailed {
            error: "decoder session crashed".to_string(),
        })
    }

    fn decode(&self, token_ids: &[u32]) -> InferenceResult<String> {
        self.inner.decode(token_ids)
    }

    fn decoder_start_token_id(&self) -> u32 {
        FAKE_START
    }

    fn eos_token_id(&self) -> u32 {
        FAKE_EOS
    }
}

pub fn failing_context() -> ModelContext {
    let generator = TextGenerator::new(Arc::new(FailingSeq2Seq::default()), GenerationParams::default());
    let embedder = SentenceEmbedder::new(Arc::new(FailingEncoder::default()), 8)
        .expect("valid batch size");
    ModelContext::new(generator, embedder)
}

pub fn fake_context() -> ModelContext {
    let generator = TextGenerator::new(Arc::new(FakeSeq2Seq::default()), GenerationParams::default());
    let embedder = SentenceEmbedder::new(Arc::new(FakeEncoder::default()), 8)
        .expect("valid batch size");
    ModelContext::new(generator, embedder)
}
