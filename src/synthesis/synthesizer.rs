//! Synthesis orchestration
//!
//! Walks a fixed stage sequence — VALIDATING, PROMPTING, GENERATING,
//! PARSING, DONE — with FAILED terminal from any stage. Validation runs
//! unconditionally before any prompt or network work; provider and parser
//! failures are absorbed into result metadata and never thrown past this
//! boundary.

use crate::error::DigestError;
use crate::services::llm::LlmClient;
use crate::synthesis::parser::InsightParser;
use crate::synthesis::prompt::PromptBuilder;
use crate::types::{ContentChunk, Insight, LearningContext};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pipeline stage a synthesis call reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStage {
    Validating,
    Prompting,
    Generating,
    Parsing,
    Done,
    Failed,
}

/// Metadata describing a synthesis attempt
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisMetadata {
    /// Terminal stage, `Done` or `Failed`
    pub stage: SynthesisStage,

    /// Stage that was executing when the attempt failed
    pub failed_stage: Option<SynthesisStage>,

    /// Model used (or that would have been used)
    pub model_id: String,

    /// Number of chunks supplied to the call
    pub chunk_count: usize,

    /// Insights requested from the model
    pub requested_insights: usize,

    /// Insights that survived parsing
    pub produced_insights: usize,

    /// Whether the strict-mode prompt suffix was applied
    pub stricter: bool,

    /// Timestamp of the attempt
    pub generated_at: DateTime<Utc>,

    /// Failure description, present iff `stage == Failed`
    pub error: Option<String>,
}

/// Outcome of a synthesis call: insights plus attempt metadata.
///
/// Synthesis failure is reported through `metadata.error`, not panicked or
/// propagated; callers inspect the metadata to distinguish outcomes.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub insights: Vec<Insight>,
    pub metadata: SynthesisMetadata,
}

impl SynthesisResult {
    pub fn failed(&self) -> bool {
        self.metadata.stage == SynthesisStage::Failed
    }
}

/// Orchestrates PromptBuilder → LlmClient → InsightParser.
///
/// Holds no state between calls beyond the builder's template cache.
pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptBuilder>,
    parser: InsightParser,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptBuilder>) -> Self {
        Self {
            llm,
            prompts,
            parser: InsightParser::new(),
        }
    }

    /// Synthesize insights from retrieved chunks.
    ///
    /// `stricter` regenerates with the strict system-prompt suffix, used by
    /// the quality-gate retry loop.
    pub async fn synthesize(
        &self,
        chunks: &[ContentChunk],
        learning_context: &LearningContext,
        query: &str,
        num_insights: usize,
        stricter: bool,
    ) -> SynthesisResult {
        let model_id = self.llm.model_info().model;
        let base = SynthesisMetadata {
            stage: SynthesisStage::Done,
            failed_stage: None,
            model_id,
            chunk_count: chunks.len(),
            requested_insights: num_insights,
            produced_insights: 0,
            stricter,
            generated_at: Utc::now(),
            error: None,
        };

        // VALIDATING — must run before any prompt or network work
        if let Err(e) = Self::validate_input(chunks, learning_context, query) {
            warn!(error = %e, "Synthesis input validation failed");
            return Self::fail(base, SynthesisStage::Validating, format!("invalid inputs: {}", e));
        }

        // PROMPTING
        let context_text = self.prompts.build_context_text(chunks);
        let payload = match self.prompts.build_synthesis_prompt(
            &context_text,
            learning_context,
            query,
            num_insights,
            stricter,
        ) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Prompt construction failed");
                return Self::fail(base, SynthesisStage::Prompting, e.to_string());
            }
        };

        // GENERATING
        debug!(chunks = chunks.len(), stricter, "Invoking LLM for synthesis");
        let raw_text = match self.llm.generate(&payload.system_text, &payload.user_text).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "LLM generation failed");
                return Self::fail(base, SynthesisStage::Generating, e.to_string());
            }
        };

        // PARSING
        let known_ids: HashSet<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let insights = match self.parser.parse(&raw_text, &known_ids) {
            Ok(insights) => insights,
            Err(e) => {
                warn!(error = %e, "Response parsing failed");
                return Self::fail(base, SynthesisStage::Parsing, e.to_string());
            }
        };

        info!(
            produced = insights.len(),
            requested = num_insights,
            "Synthesis complete"
        );

        let mut metadata = base;
        metadata.produced_insights = insights.len();
        SynthesisResult { insights, metadata }
    }

    fn validate_input(
        chunks: &[ContentChunk],
        learning_context: &LearningContext,
        query: &str,
    ) -> crate::error::Result<()> {
        if chunks.is_empty() {
            return Err(DigestError::Validation("no chunks provided".to_string()));
        }
        if query.trim().is_empty() {
            return Err(DigestError::Validation("empty query".to_string()));
        }
        learning_context.validate()
    }

    fn fail(base: SynthesisMetadata, at: SynthesisStage, error: String) -> SynthesisResult {
        SynthesisResult {
            insights: vec![],
            metadata: SynthesisMetadata {
                stage: SynthesisStage::Failed,
                failed_stage: Some(at),
                error: Some(error),
                ..base
            },
        }
    }
}
