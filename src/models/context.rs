//! Model lifecycle
//!
//! `ModelContext` owns the generator and the sentence embedder. It is built
//! once before the listener starts and is never mutated afterwards, so
//! handlers share it behind an `Arc`.

use crate::models::embedder::SentenceEmbedder;
use crate::models::generator::TextGenerator;

#[derive(Debug, Clone)]
pub struct ModelContext {
    generator: TextGenerator,
    embedder: SentenceEmbedder,
}

impl ModelContext {
    pub fn new(generator: TextGenerator, embedder: SentenceEmbedder) -> Self {
        Self { generator, embedder }
    }

    /// Load both models from ONNX exports. Any failure is returned and the
    /// server must not start.
    #[cfg(feature = "onnx")]
    pub fn load(
        models: &crate::models::ModelsConfig,
        runtime: &crate::models::OnnxRuntimeConfig,
        generation: &crate::models::GenerationConfig,
        embedding: &crate::models::EmbeddingConfig,
    ) -> crate::models::InferenceResult<Self> {
        use crate::models::EmbeddingBackend;
        use crate::onnx::{OnnxEmbeddingEngine, OnnxSeq2SeqEngine};
        use std::sync::Arc;
        use tracing::info;

        generation.validate()?;
        embedding.validate()?;

        info!("{}", "=".repeat(50));
        info!("📦 Loading models, the first run may download them...");
        info!("{}", "=".repeat(50));

        info!("🔤 Loading text generator from {}", models.generator_dir.display());
        let seq2seq = OnnxSeq2SeqEngine::load(models, generation, runtime)?;
        info!("✅ Text generator loaded");

        info!("🧮 Loading sentence encoder from {}", models.embedder_dir.display());
        let encoder = OnnxEmbeddingEngine::load(models, embedding, runtime)?;
        info!("✅ Sentence encoder loaded ({} dimensions)", encoder.dimension());

        let generator = TextGenerator::new(Arc::new(seq2seq), generation.params());
        let embedder = SentenceEmbedder::new(Arc::new(encoder), embedding.batch_size)?;

        info!("🎉 All models ready");
        Ok(Self::new(generator, embedder))
    }

    pub fn generator(&self) -> &TextGenerator {
        &self.generator
    }

    pub fn embedder(&self) -> &SentenceEmbedder {
        &self.embedder
    }
}
