//! Top-level digest generation
//!
//! Coordinates the pipeline stages in strict sequence: retrieve, synthesize,
//! evaluate. Failures surface as structured failure digests rather than
//! panics or propagated errors, so the surrounding agent loop always gets a
//! digest it can report. "No content found" and "generation failed" remain
//! distinguishable by badge and metadata.

use crate::config::DigestConfig;
use crate::evaluation::Evaluator;
use crate::retrieval::{ContextSource, Retriever};
use crate::synthesis::{SynthesisResult, Synthesizer};
use crate::types::{
    ContentChunk, Digest, DigestMetadata, DigestMode, LearningContext, QualityScores,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Badge for digests short-circuited on empty retrieval
pub const BADGE_NO_CONTENT: &str = "no content";

/// Badge for digests that skipped evaluation (fast path)
pub const BADGE_UNSCORED: &str = "unscored";

/// Generates learning digests end to end.
///
/// Collaborators are injected at construction; the generator owns no
/// persistent state and every call runs the stages fresh.
pub struct DigestGenerator {
    retriever: Arc<dyn Retriever>,
    context_source: Arc<dyn ContextSource>,
    synthesizer: Synthesizer,
    evaluator: Evaluator,
    config: DigestConfig,
}

impl DigestGenerator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        context_source: Arc<dyn ContextSource>,
        synthesizer: Synthesizer,
        evaluator: Evaluator,
        config: DigestConfig,
    ) -> Self {
        Self {
            retriever,
            context_source,
            synthesizer,
            evaluator,
            config,
        }
    }

    /// Generate a digest for `user_id` on `query_or_topic`.
    ///
    /// Never raises past this boundary: retrieval transport errors,
    /// synthesis failures, and degraded evaluations all come back as
    /// structured digests.
    pub async fn generate(&self, user_id: &str, query_or_topic: &str, mode: DigestMode) -> Digest {
        info!(user_id, %mode, "Generating digest");

        let (top_k, similarity_threshold, num_insights) = self.retrieval_params(mode);

        // Retrieve (stage 1; strictly before synthesis)
        let chunks = match self
            .retriever
            .retrieve(query_or_topic, user_id, top_k, similarity_threshold)
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "Retrieval failed");
                return self.failure_digest(query_or_topic, mode, format!("retrieval failed: {}", e));
            }
        };

        if chunks.is_empty() {
            info!("No chunks cleared the similarity threshold, returning no-content digest");
            return self.no_content_digest(query_or_topic, mode);
        }

        let learning_context = self.resolve_context(user_id).await;

        // Synthesize (stage 2), then evaluate (stage 3) with a bounded
        // strict-mode retry loop when the quality gate fails.
        let mut stricter = false;
        let mut attempt: u32 = 0;
        loop {
            let synthesis = self
                .synthesizer
                .synthesize(&chunks, &learning_context, query_or_topic, num_insights, stricter)
                .await;

            let failed = synthesis.failed();
            let empty = synthesis.insights.is_empty();
            let digest = self.assemble(query_or_topic, mode, &chunks, synthesis).await;

            // Strict retries only help when the model produced gateable
            // insights; synthesis failures and empty parses return as-is.
            if failed || empty {
                return digest;
            }

            if digest.passed_gate || attempt >= self.config.max_gate_retries {
                if !digest.passed_gate && attempt > 0 {
                    warn!(
                        attempts = attempt + 1,
                        "Quality gate still failing after strict retries, delivering anyway"
                    );
                }
                return digest;
            }

            attempt += 1;
            stricter = true;
            info!(attempt, "Quality gate failed, regenerating with stricter synthesis");
        }
    }

    /// Evaluate one synthesis attempt and fill in generator-level metadata.
    async fn assemble(
        &self,
        query: &str,
        mode: DigestMode,
        chunks: &[ContentChunk],
        synthesis: SynthesisResult,
    ) -> Digest {
        let synthesis_error = synthesis.metadata.error.clone();
        let model_id = synthesis.metadata.model_id.clone();

        let mut digest = if self.config.skip_evaluation && !synthesis.failed() {
            Digest {
                id: Uuid::new_v4(),
                metadata: DigestMetadata {
                    query: query.to_string(),
                    mode: None,
                    chunk_count: chunks.len(),
                    insight_count: synthesis.insights.len(),
                    model_id: None,
                    error: None,
                },
                insights: synthesis.insights,
                quality: QualityScores::zeroed("Evaluation skipped"),
                passed_gate: true,
                badge: BADGE_UNSCORED.to_string(),
                generated_at: Utc::now(),
            }
        } else {
            // A failed synthesis carries empty insights; the evaluator turns
            // that into a failing digest rather than an error.
            self.evaluator.evaluate(query, synthesis.insights, chunks).await
        };

        digest.metadata.mode = Some(mode);
        digest.metadata.model_id = Some(model_id);
        if synthesis_error.is_some() {
            digest.metadata.error = synthesis_error;
            digest.passed_gate = false;
        }
        digest
    }

    /// Mode-dependent retrieval breadth: digest mode retrieves broadly with
    /// the configured knobs, qna narrows to fewer, more targeted chunks.
    fn retrieval_params(&self, mode: DigestMode) -> (usize, f64, usize) {
        match mode {
            DigestMode::Digest => (
                self.config.top_k,
                self.config.similarity_threshold,
                self.config.capped_num_insights(),
            ),
            DigestMode::Qna => (
                self.config.top_k.min(5),
                self.config.similarity_threshold.max(0.5),
                self.config.capped_num_insights().min(3),
            ),
        }
    }

    /// Fetch the user's learning context, falling back to a generic default
    /// when the source has nothing for this user.
    async fn resolve_context(&self, user_id: &str) -> LearningContext {
        match self.context_source.learning_context(user_id).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(user_id, error = %e, "No learning context available, using defaults");
                LearningContext {
                    current_week: None,
                    topics: vec!["AI".to_string(), "Machine Learning".to_string()],
                    difficulty: "intermediate".to_string(),
                    goals: "General AI/ML learning".to_string(),
                }
            }
        }
    }

    fn no_content_digest(&self, query: &str, mode: DigestMode) -> Digest {
        Digest {
            id: Uuid::new_v4(),
            insights: vec![],
            quality: QualityScores::zeroed("No relevant content found"),
            passed_gate: false,
            badge: BADGE_NO_CONTENT.to_string(),
            generated_at: Utc::now(),
            metadata: DigestMetadata {
                query: query.to_string(),
                mode: Some(mode),
                chunk_count: 0,
                insight_count: 0,
                model_id: None,
                error: None,
            },
        }
    }

    fn failure_digest(&self, query: &str, mode: DigestMode, error: String) -> Digest {
        Digest {
            id: Uuid::new_v4(),
            insights: vec![],
            quality: QualityScores::zeroed(error.clone()),
            passed_gate: false,
            badge: "failed".to_string(),
            generated_at: Utc::now(),
            metadata: DigestMetadata {
                query: query.to_string(),
                mode: Some(mode),
                chunk_count: 0,
                insight_count: 0,
                model_id: None,
                error: Some(error),
            },
        }
    }
}
