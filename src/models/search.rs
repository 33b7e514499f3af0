//! Brute-force cosine similarity search over chunk embeddings

use crate::models::{InferenceError, InferenceResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredChunk {
    /// Position of the chunk in the searched list
    pub index: usize,
    pub score: f32,
}

/// Rank `embeddings` by cosine similarity to `query`, best first.
///
/// At most `k` results are returned; ties keep the lower index first.
pub fn top_k_similar(
    query: &[f32],
    embeddings: &[Vec<f32>],
    k: usize,
) -> InferenceResult<Vec<ScoredChunk>> {
    if let Some((index, embedding)) = embeddings
        .iter()
        .enumerate()
        .find(|(_, embedding)| embedding.len() != query.len())
    {
        return Err(InferenceError::InvalidInput {
            message: format!(
                "Embedding {} has dimension {} but the query has {}",
                index,
                embedding.len(),
                query.len()
            ),
        });
    }

    let query_norm = l2_norm(query);
    let mut scored: Vec<ScoredChunk> = embeddings
        .iter()
        .enumerate()
        .map(|(index, embedding)| ScoredChunk {
            index,
            score: cosine(query, query_norm, embedding),
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
    scored.truncate(k);
    Ok(scored)
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(query: &[f32], query_norm: f32, other: &[f32]) -> f32 {
    let denom = query_norm * l2_norm(other);
    if denom == 0.0 {
        return 0.0;
    }
    let dot: f32 = query.iter().zip(other).map(|(a, b)| a * b).sum();
    dot / denom
}
