//! Core data types for the noesis digest pipeline
//!
//! This module defines the fundamental data structures flowing through the
//! retrieval → synthesis → evaluation pipeline: retrieved chunks, the user's
//! learning context, synthesized insights, quality scores, and the final
//! digest artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Source metadata attached to a retrieved content chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Title of the source document
    pub title: String,

    /// Author, if known
    pub author: String,

    /// Canonical URL of the source
    pub url: String,

    /// Publication timestamp as supplied by the ingestion layer
    pub published_at: Option<DateTime<Utc>>,
}

/// A retrieved snippet of source content with a similarity score.
///
/// Produced by the retrieval collaborator, immutable once returned, and
/// ordered by descending similarity within a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Stable chunk identifier, used to trace insight claims back to sources
    pub id: String,

    /// Chunk body text
    pub text: String,

    /// Metadata describing where the chunk came from
    pub source: SourceMetadata,

    /// Similarity score against the retrieval query, in [0, 1]
    pub similarity: f64,
}

impl ContentChunk {
    /// Create a chunk with default source metadata (test and fixture helper)
    pub fn new(id: impl Into<String>, text: impl Into<String>, similarity: f64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source: SourceMetadata::default(),
            similarity,
        }
    }
}

/// The user's current learning context, passed through to prompts.
///
/// The reference system carried this as an untyped mapping; here it is a
/// validated struct checked once at the synthesizer's VALIDATING stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningContext {
    /// Week number in the user's curriculum, if tracked
    pub current_week: Option<u32>,

    /// Topics the user is currently studying
    pub topics: Vec<String>,

    /// Self-reported difficulty level (e.g. "beginner", "intermediate")
    pub difficulty: String,

    /// Free-form learning goals
    pub goals: String,
}

impl LearningContext {
    /// Check the context is well-formed enough to personalize a prompt.
    ///
    /// Requires a difficulty level and at least one of topics/goals; a
    /// context with neither gives synthesis nothing to anchor on.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.difficulty.trim().is_empty() {
            return Err(crate::error::DigestError::Validation(
                "learning context has no difficulty level".to_string(),
            ));
        }
        if self.topics.iter().all(|t| t.trim().is_empty()) && self.goals.trim().is_empty() {
            return Err(crate::error::DigestError::Validation(
                "learning context has neither topics nor goals".to_string(),
            ));
        }
        Ok(())
    }

    /// Topics joined for prompt substitution, with a generic fallback
    pub fn topics_text(&self) -> String {
        if self.topics.is_empty() {
            "AI and Machine Learning".to_string()
        } else {
            self.topics.join(", ")
        }
    }
}

/// Fully rendered prompt text, ready for the LLM.
///
/// Created fresh per synthesis call; only template bodies are cached.
#[derive(Debug, Clone)]
pub struct PromptPayload {
    pub system_text: String,
    pub user_text: String,
}

/// A single structured claim synthesized from retrieved chunks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// The synthesized claim shown to the user
    pub claim: String,

    /// Ids of the chunks that support this claim.
    ///
    /// Invariant: always a subset of the chunk ids supplied to the synthesis
    /// call that produced this insight. The parser drops violators.
    pub supporting_chunk_ids: BTreeSet<String>,

    /// Model-reported confidence in [0, 1], when provided
    pub confidence: Option<f64>,
}

/// Grounding quality scores for a digest.
///
/// Always fully populated: degraded evaluations carry zero or fallback
/// values plus an `error` string rather than missing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    /// Factual consistency of claims against retrieved context, in [0, 1]
    pub faithfulness: f64,

    /// Relevance of the retrieved chunks to the query, in [0, 1]
    pub context_precision: f64,

    /// Coverage of the retrieved context by the claims, in [0, 1]
    pub context_recall: f64,

    /// Arithmetic mean of the three metrics above
    pub average: f64,

    /// Set when scoring was degraded or skipped entirely
    pub error: Option<String>,
}

impl QualityScores {
    /// Scores with every metric at the same value and no error
    pub fn uniform(value: f64) -> Self {
        Self {
            faithfulness: value,
            context_precision: value,
            context_recall: value,
            average: value,
            error: None,
        }
    }

    /// Zero scores with an explanation of why nothing was scored
    pub fn zeroed(error: impl Into<String>) -> Self {
        Self {
            faithfulness: 0.0,
            context_precision: 0.0,
            context_recall: 0.0,
            average: 0.0,
            error: Some(error.into()),
        }
    }
}

/// Pipeline mode selecting retrieval breadth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestMode {
    /// Broad retrieval over the user's current topic
    Digest,

    /// Narrow retrieval on an explicit question, fewer targeted insights
    Qna,
}

impl std::fmt::Display for DigestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DigestMode::Digest => write!(f, "digest"),
            DigestMode::Qna => write!(f, "qna"),
        }
    }
}

/// Metadata recorded alongside a digest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestMetadata {
    /// The query or topic text the pipeline ran on
    pub query: String,

    /// Mode the pipeline ran in
    pub mode: Option<DigestMode>,

    /// Number of chunks the retriever supplied
    pub chunk_count: usize,

    /// Number of insights that survived parsing
    pub insight_count: usize,

    /// Model identifier used for synthesis, when synthesis ran
    pub model_id: Option<String>,

    /// Set when the pipeline degraded or failed; lets callers distinguish
    /// "no content found" from "generation failed"
    pub error: Option<String>,
}

/// The final digest payload: insights plus their quality verdict.
///
/// Terminal artifact returned to the caller; not mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    /// Unique digest identifier
    pub id: Uuid,

    /// Synthesized insights in the order the model produced them
    pub insights: Vec<Insight>,

    /// Grounding scores for the insight set
    pub quality: QualityScores,

    /// Whether the quality gate passed
    pub passed_gate: bool,

    /// Human-readable quality badge (e.g. "excellent", "no content")
    pub badge: String,

    /// Creation timestamp
    pub generated_at: DateTime<Utc>,

    /// Pipeline metadata
    pub metadata: DigestMetadata,
}
