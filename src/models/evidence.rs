//! Evidence extraction for a single rubric requirement
//!
//! The verdict comes from keyword coverage: the share of the requirement's
//! content words that appear in a retrieved chunk. Embedding similarity
//! only breaks ties between chunks and feeds the confidence.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::models::embedder::SentenceEmbedder;
use crate::models::InferenceResult;

/// Coverage at or above which a requirement passes
pub const PASS_COVERAGE: f32 = 0.6;
/// Coverage at or above which a requirement partially passes
pub const PARTIAL_COVERAGE: f32 = 0.3;
/// Share of the chunk score taken by keyword coverage, the rest by similarity
const KEYWORD_WEIGHT: f32 = 0.7;
const QUOTE_MAX_CHARS: usize = 200;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "has", "have",
    "had", "been", "its", "into", "onto", "using", "use", "should", "must", "can", "will",
    "each", "all", "any", "your", "you", "their", "them", "then", "than", "which", "what",
    "when", "where", "how", "not", "make", "sure", "least", "also", "some", "such", "per",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvidenceStatus {
    Pass,
    Partial,
    Fail,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub status: EvidenceStatus,
    /// Confidence in `status`, between 0 and 1
    pub confidence: f32,
    pub evidence_quote: String,
    pub reasoning: String,
}

impl Evidence {
    fn unknown(reasoning: &str) -> Self {
        Self {
            status: EvidenceStatus::Unknown,
            confidence: 0.0,
            evidence_quote: String::new(),
            reasoning: reasoning.to_string(),
        }
    }
}

/// Lowercased content words of `text`, first occurrence order, no repeats.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    let mut seen = HashSet::new();

    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 2 && !stop_words.contains(w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

fn matched_keywords<'k>(text: &str, keywords: &'k [String]) -> Vec<&'k str> {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .filter(|k| lower.contains(k.as_str()))
        .map(String::as_str)
        .collect()
}

/// The line of `chunk` mentioning the most keywords, shortened for display.
fn best_line(chunk: &str, keywords: &[String]) -> String {
    let mut best = ("", 0usize);
    for line in chunk.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let hits = matched_keywords(line, keywords).len();
        if hits > best.1 {
            best = (line, hits);
        }
    }
    best.0.chars().take(QUOTE_MAX_CHARS).collect()
}

/// Judge whether `chunks` satisfy `requirement`.
pub fn extract_evidence(
    requirement: &str,
    chunks: &[String],
    embedder: &SentenceEmbedder,
) -> InferenceResult<Evidence> {
    if chunks.is_empty() {
        return Ok(Evidence::unknown("No code chunks were retrieved for this requirement"));
    }
    let keywords = extract_keywords(requirement);
    if keywords.is_empty() {
        return Ok(Evidence::unknown("The requirement has no keywords to match"));
    }

    let mut texts = Vec::with_capacity(chunks.len() + 1);
    texts.push(requirement.to_string());
    texts.extend(chunks.iter().cloned());
    let embeddings = embedder.embed(&texts)?;
    let query = embeddings.row(0);

    // (chunk index, coverage, combined score)
    let mut best: Option<(usize, f32, f32)> = None;
    for (i, chunk) in chunks.iter().enumerate() {
        let coverage = matched_keywords(chunk, &keywords).len() as f32 / keywords.len() as f32;
        let similarity = embeddings.row(i + 1).dot(&query).max(0.0);
        let score = KEYWORD_WEIGHT * coverage + (1.0 - KEYWORD_WEIGHT) * similarity;
        debug!("Chunk {}: coverage {:.2}, similarity {:.2}", i, coverage, similarity);

        if best.map_or(true, |(_, _, top)| score > top) {
            best = Some((i, coverage, score));
        }
    }
    let Some((index, coverage, score)) = best else {
        return Ok(Evidence::unknown("No code chunks were retrieved for this requirement"));
    };

    let chunk = &chunks[index];
    let matched = matched_keywords(chunk, &keywords);
    let missing: Vec<&str> = keywords
        .iter()
        .map(String::as_str)
        .filter(|k| !matched.contains(k))
        .collect();
    let score = score.clamp(0.0, 1.0);

    let status = if coverage >= PASS_COVERAGE {
        EvidenceStatus::Pass
    } else if coverage >= PARTIAL_COVERAGE {
        EvidenceStatus::Partial
    } else {
        EvidenceStatus::Fail
    };

    let evidence = match status {
        EvidenceStatus::Fail => Evidence {
            status,
            // A weak best match is strong evidence of absence
            confidence: 1.0 - score,
            evidence_quote: String::new(),
            reasoning: format!(
                "Only {} of {} requirement keywords appear in the retrieved code (missing: {})",
                matched.len(),
                keywords.len(),
                missing.join(", ")
            ),
        },
        _ => {
            let mut reasoning = format!(
                "Chunk {} matches {} of {} requirement keywords ({})",
                index,
                matched.len(),
                keywords.len(),
                matched.join(", ")
            );
            if !missing.is_empty() {
                reasoning.push_str(&format!("; missing: {}", missing.join(", ")));
            }
            Evidence {
                status,
                confidence: score,
                evidence_quote: best_line(chunk, &keywords),
                reasoning,
            }
        }
    };

    Ok(evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::{fake_context, texts};

    const REQUIREMENT: &str = "Train a logistic regression model";

    #[test]
    fn test_keywords() {
        assert_eq!(
            extract_keywords("Train a logistic regression model, then train it again!"),
            vec!["train", "logistic", "regression", "model", "again"]
        );
        assert_eq!(extract_keywords("Use the x_train split"), vec!["x_train", "split"]);
        assert!(extract_keywords("Do it on a PC").is_empty());
    }

    #[test]
    fn test_full_coverage_passes_with_quote() {
        let context = fake_context();
        let chunks = texts(&[
            "import pandas as pd\ndf = pd.read_csv('data.csv')",
            "model = LogisticRegression()\nmodel.fit(X_train, y_train)",
        ]);

        let evidence = extract_evidence(REQUIREMENT, &chunks, context.embedder()).unwrap();

        assert_eq!(evidence.status, EvidenceStatus::Pass);
        assert_eq!(evidence.evidence_quote, "model = LogisticRegression()");
        assert!(evidence.reasoning.starts_with("Chunk 1 matches 4 of 4"));
        assert!(evidence.confidence >= KEYWORD_WEIGHT && evidence.confidence <= 1.0);
    }

    #[test]
    fn test_half_coverage_is_partial() {
        let context = fake_context();
        let chunks = texts(&["regression_model = fit(data)"]);

        let evidence = extract_evidence(REQUIREMENT, &chunks, context.embedder()).unwrap();

        assert_eq!(evidence.status, EvidenceStatus::Partial);
        assert_eq!(evidence.evidence_quote, "regression_model = fit(data)");
        assert!(evidence.reasoning.contains("missing: train, logistic"));
    }

    #[test]
    fn test_unrelated_code_fails() {
        let context = fake_context();
        let chunks = texts(&["print('hello')", "x = 1 + 2"]);

        let evidence = extract_evidence(REQUIREMENT, &chunks, context.embedder()).unwrap();

        assert_eq!(evidence.status, EvidenceStatus::Fail);
        assert!(evidence.evidence_quote.is_empty());
        assert!(evidence.confidence > 0.0 && evidence.confidence <= 1.0);
    }

    #[test]
    fn test_no_chunks_is_unknown() {
        let context = fake_context();
        let evidence = extract_evidence(REQUIREMENT, &[], context.embedder()).unwrap();
        assert_eq!(evidence.status, EvidenceStatus::Unknown);
        assert_eq!(evidence.confidence, 0.0);
    }

    #[test]
    fn test_requirement_without_keywords_is_unknown() {
        let context = fake_context();
        let evidence = extract_evidence("Do it", &texts(&["do_it()"]), context.embedder()).unwrap();
        assert_eq!(evidence.status, EvidenceStatus::Unknown);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(serde_json::to_value(EvidenceStatus::Partial).unwrap(), "PARTIAL");
    }
}
