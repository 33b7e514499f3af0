//! Masked mean pooling and L2 normalization of token embeddings.

use ndarray::{Array2, ArrayView2, ArrayView3, Axis};

use crate::models::{InferenceError, InferenceResult};

/// Lower bound for the per-row mask sum, so fully padded rows divide by a
/// non-zero count.
pub const MASK_SUM_FLOOR: f32 = 1e-9;

/// Lower bound for the row norm during normalization.
pub const NORM_EPSILON: f32 = 1e-12;

/// Average token vectors over the positions where the mask is set.
///
/// `token_embeddings` is `[batch, sequence, hidden]`, `attention_mask` is
/// `[batch, sequence]` with values in `{0, 1}`. Returns `[batch, hidden]`.
/// A row whose mask is all zero pools to the zero vector.
pub fn mean_pool(
    token_embeddings: ArrayView3<f32>,
    attention_mask: ArrayView2<i64>,
) -> InferenceResult<Array2<f32>> {
    let (batch, seq_len, _) = token_embeddings.dim();
    if attention_mask.dim() != (batch, seq_len) {
        return Err(InferenceError::InferenceFailed {
            error: format!(
                "Attention mask shape {:?} doesn't match token embeddings [{}, {}, _]",
                attention_mask.dim(),
                batch,
                seq_len
            ),
        });
    }

    let mask = attention_mask.mapv(|m| m as f32);
    let expanded = mask.view().insert_axis(Axis(2));

    let summed = (&token_embeddings * &expanded).sum_axis(Axis(1));
    let counts = mask
        .sum_axis(Axis(1))
        .mapv(|count| count.max(MASK_SUM_FLOOR))
        .insert_axis(Axis(1));

    Ok(&summed / &counts)
}

/// Scale every row to unit Euclidean length. Zero rows stay zero.
pub fn l2_normalize(mut vectors: Array2<f32>) -> Array2<f32> {
    for mut row in vectors.rows_mut() {
        let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        row /= norm.max(NORM_EPSILON);
    }
    vectors
}
