//! Next-token selection: greedy argmax or temperature / top-k sampling.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::models::{InferenceError, InferenceResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    /// Draw from the distribution instead of taking the argmax
    pub do_sample: bool,
    pub temperature: f32,
    /// Keep only the k highest logits, 0 disables the filter
    pub top_k: usize,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            do_sample: true,
            temperature: 0.7,
            top_k: 50,
        }
    }
}

impl SamplingParams {
    pub fn greedy() -> Self {
        Self {
            do_sample: false,
            temperature: 1.0,
            top_k: 0,
        }
    }
}

/// Pick the next token id from a logits vector.
///
/// With sampling disabled or a non-positive temperature this is a plain
/// argmax. Non-finite logits are never selected.
pub fn sample_token<R: Rng + ?Sized>(
    logits: &[f32],
    params: &SamplingParams,
    rng: &mut R,
) -> InferenceResult<u32> {
    let mut candidates: Vec<(usize, f32)> = logits
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, logit)| logit.is_finite())
        .collect();

    if candidates.is_empty() {
        return Err(InferenceError::InferenceFailed {
            error: format!("No finite logits among {} candidates", logits.len()),
        });
    }

    if !params.do_sample || params.temperature <= 0.0 {
        return Ok(argmax(&candidates));
    }

    if params.top_k > 0 && params.top_k < candidates.len() {
        candidates.select_nth_unstable_by(params.top_k - 1, |a, b| b.1.total_cmp(&a.1));
        candidates.truncate(params.top_k);
    }

    let max_logit = candidates
        .iter()
        .map(|(_, logit)| *logit)
        .fold(f32::NEG_INFINITY, f32::max);
    let weights: Vec<f32> = candidates
        .iter()
        .map(|(_, logit)| ((logit - max_logit) / params.temperature).exp())
        .collect();

    let distribution = WeightedIndex::new(&weights).map_err(|e| InferenceError::InferenceFailed {
        error: format!("Invalid sampling distribution: {}", e),
    })?;

    Ok(candidates[distribution.sample(rng)].0 as u32)
}

fn argmax(candidates: &[(usize, f32)]) -> u32 {
    candidates
        .iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(idx, _)| *idx as u32)
        .unwrap_or(0)
}
