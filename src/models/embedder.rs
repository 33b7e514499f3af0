//! Sentence embedding batcher
//!
//! Splits the input texts into fixed-size chunks, runs each chunk through a
//! tokenizer and encoder, then pools and normalizes the token vectors.

use ndarray::{Array2, Array3, Axis};
use std::sync::Arc;
use tracing::debug;

use crate::models::pooling::{l2_normalize, mean_pool};
use crate::models::{InferenceError, InferenceResult};

/// Batch size used when none is configured
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Tokenized chunk, padded to its longest sequence
#[derive(Debug, Clone)]
pub struct TokenBatch {
    /// `[batch, sequence]`
    pub input_ids: Array2<i64>,
    /// `[batch, sequence]`, 1 for real tokens and 0 for padding
    pub attention_mask: Array2<i64>,
    /// `[batch, sequence]`
    pub token_type_ids: Array2<i64>,
}

impl TokenBatch {
    /// Build a batch from rows that are already padded to the same length.
    pub fn from_rows(
        ids: Vec<Vec<u32>>,
        masks: Vec<Vec<u32>>,
        type_ids: Vec<Vec<u32>>,
    ) -> InferenceResult<Self> {
        let batch = ids.len();
        let seq_len = ids.first().map(Vec::len).unwrap_or(0);

        let to_array = |rows: Vec<Vec<u32>>| -> InferenceResult<Array2<i64>> {
            if rows.len() != batch || rows.iter().any(|row| row.len() != seq_len) {
                return Err(InferenceError::TokenizationFailed {
                    error: format!("Token rows are not padded to a common length of {}", seq_len),
                });
            }
            let flat: Vec<i64> = rows.into_iter().flatten().map(i64::from).collect();
            Ok(Array2::from_shape_vec((batch, seq_len), flat)?)
        };

        Ok(Self {
            input_ids: to_array(ids)?,
            attention_mask: to_array(masks)?,
            token_type_ids: to_array(type_ids)?,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.input_ids.nrows()
    }

    pub fn seq_len(&self) -> usize {
        self.input_ids.ncols()
    }
}

/// Tokenizer plus encoder of a sentence embedding model.
///
/// Implementations are inference-only and shared read-only between requests.
pub trait EmbeddingBackend: Send + Sync {
    /// Tokenize one chunk, padding to the longest text and truncating long ones.
    fn tokenize(&self, texts: &[&str]) -> InferenceResult<TokenBatch>;

    /// Per-token output vectors, `[batch, sequence, hidden]`.
    fn forward(&self, batch: &TokenBatch) -> InferenceResult<Array3<f32>>;

    /// Hidden size of the encoder
    fn dimension(&self) -> usize;
}

/// Embeds lists of texts in fixed-size batches
#[derive(Clone)]
pub struct SentenceEmbedder {
    backend: Arc<dyn EmbeddingBackend>,
    batch_size: usize,
}

impl std::fmt::Debug for SentenceEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceEmbedder")
            .field("dimension", &self.backend.dimension())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl SentenceEmbedder {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, batch_size: usize) -> InferenceResult<Self> {
        if batch_size == 0 {
            return Err(InferenceError::InvalidInput {
                message: "Batch size must be at least 1".to_string(),
            });
        }
        Ok(Self { backend, batch_size })
    }

    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    /// Embed `texts` with the configured batch size.
    ///
    /// Returns `[texts.len(), dimension]`, one unit-length row per text in
    /// input order. An empty list gives an empty `[0, dimension]` array.
    pub fn embed(&self, texts: &[String]) -> InferenceResult<Array2<f32>> {
        self.embed_with_batch_size(texts, self.batch_size)
    }

    pub fn embed_with_batch_size(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> InferenceResult<Array2<f32>> {
        if batch_size == 0 {
            return Err(InferenceError::InvalidInput {
                message: "Batch size must be at least 1".to_string(),
            });
        }

        let dimension = self.backend.dimension();
        let mut embeddings = Array2::<f32>::zeros((0, dimension));

        for chunk in texts.chunks(batch_size) {
            let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();
            let batch = self.backend.tokenize(&refs)?;
            debug!(
                "Encoding chunk of {} texts padded to {} tokens",
                batch.batch_size(),
                batch.seq_len()
            );

            let hidden = self.backend.forward(&batch)?;
            let pooled = mean_pool(hidden.view(), batch.attention_mask.view())?;
            let normalized = l2_normalize(pooled);

            if normalized.dim() != (chunk.len(), dimension) {
                return Err(InferenceError::InferenceFailed {
                    error: format!(
                        "Encoder returned {:?} for a chunk of {} texts (expected dimension {})",
                        normalized.dim(),
                        chunk.len(),
                        dimension
                    ),
                });
            }

            embeddings.append(Axis(0), normalized.view())?;
        }

        Ok(embeddings)
    }

    /// Embed a single text.
    pub fn embed_one(&self, text: &str) -> InferenceResult<crate::models::Embedding> {
        let embeddings = self.embed_with_batch_size(&[text.to_string()], 1)?;
        Ok(embeddings.row(0).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::{texts, FakeEncoder, FAKE_DIMENSION};

    fn embedder(batch_size: usize) -> SentenceEmbedder {
        SentenceEmbedder::new(Arc::new(FakeEncoder::default()), batch_size).unwrap()
    }

    fn norm(row: ndarray::ArrayView1<f32>) -> f32 {
        row.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_output_matches_input_length() {
        let input = texts(&["Hello world", "Test sentence", "a b c d", "x"]);
        let embeddings = embedder(3).embed(&input).unwrap();

        assert_eq!(embeddings.dim(), (4, FAKE_DIMENSION));
        for row in embeddings.rows() {
            assert!((norm(row) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_empty_input_gives_empty_output() {
        let embeddings = embedder(8).embed(&[]).unwrap();
        assert_eq!(embeddings.dim(), (0, FAKE_DIMENSION));
    }

    #[test]
    fn test_empty_text_gives_zero_vector() {
        let input = texts(&["", "not empty"]);
        let embeddings = embedder(8).embed(&input).unwrap();

        assert!(embeddings.row(0).iter().all(|&x| x == 0.0));
        assert!((norm(embeddings.row(1)) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_batch_size_does_not_change_results() {
        let input = texts(&[
            "short",
            "a somewhat longer sentence with padding",
            "mid length text",
            "",
            "one two three four five six",
            "last",
        ]);

        let reference = embedder(1).embed(&input).unwrap();
        for batch_size in [2, 3, 4, 8, 100] {
            let batched = embedder(batch_size).embed(&input).unwrap();
            for (a, b) in reference.iter().zip(batched.iter()) {
                assert!((a - b).abs() < 1e-6, "batch size {} changed output", batch_size);
            }
        }
    }

    #[test]
    fn test_same_text_is_deterministic() {
        let embedder = embedder(8);
        let first = embedder.embed_one("Hello world").unwrap();
        let second = embedder.embed_one("Hello world").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_order_is_preserved() {
        let embedder = embedder(2);
        let input = texts(&["alpha", "beta", "gamma"]);
        let embeddings = embedder.embed(&input).unwrap();

        for (i, text) in input.iter().enumerate() {
            assert_eq!(embeddings.row(i).to_vec(), embedder.embed_one(text).unwrap());
        }
    }

    #[test]
    fn test_long_text_is_truncated() {
        let encoder = FakeEncoder::with_max_length(4);
        let embedder = SentenceEmbedder::new(Arc::new(encoder), 8).unwrap();

        let truncated = embedder.embed_one("w1 w2 w3 w4 w5 w6 w7").unwrap();
        let prefix = embedder.embed_one("w1 w2 w3 w4").unwrap();
        assert_eq!(truncated, prefix);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(SentenceEmbedder::new(Arc::new(FakeEncoder::default()), 0).is_err());
        assert!(embedder(8).embed_with_batch_size(&texts(&["x"]), 0).is_err());
    }

    #[test]
    fn test_token_batch_rejects_ragged_rows() {
        let result = TokenBatch::from_rows(
            vec![vec![1, 2], vec![3]],
            vec![vec![1, 1], vec![1]],
            vec![vec![0, 0], vec![0]],
        );
        assert!(result.is_err());
    }
}
