//! Noesis - Retrieval-Augmented Learning Digest Engine
//!
//! Synthesizes a personalized "learning digest" for a user by:
//! - Retrieving relevant content chunks from a vector store collaborator
//! - Prompting an LLM provider for structured insights
//! - Parsing the model's response with layered recovery strategies
//! - Scoring the result for factual grounding and applying a quality gate
//!
//! # Architecture
//!
//! The pipeline runs leaves-first:
//! - **Types**: chunks, learning context, insights, scores, the digest
//! - **Services**: provider-agnostic LLM invocation
//! - **Synthesis**: prompt building, generation, response parsing
//! - **Evaluation**: concurrent grounding metrics and the pass/fail gate
//! - **Digest**: the top-level retrieve → synthesize → evaluate coordinator
//!
//! # Example
//!
//! ```ignore
//! use noesis::{
//!     DigestConfig, DigestGenerator, DigestMode, Evaluator, HttpLlmClient, LlmConfig, LlmJudge,
//!     MetricsEngine, PromptBuilder, Synthesizer,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> noesis::Result<()> {
//!     let config = DigestConfig::load(None)?;
//!     let llm: Arc<dyn noesis::LlmClient> = Arc::new(HttpLlmClient::new(LlmConfig {
//!         provider: config.provider,
//!         model: config.resolved_model_id(),
//!         api_key: config.api_key()?,
//!         temperature: config.temperature,
//!         max_tokens: config.max_tokens,
//!     })?);
//!
//!     let prompts = Arc::new(PromptBuilder::new(&config.templates_dir));
//!     let synthesizer = Synthesizer::new(Arc::clone(&llm), prompts);
//!     let metrics = MetricsEngine::new(Arc::new(LlmJudge::new(Arc::clone(&llm))));
//!     let evaluator = Evaluator::new(metrics, config.gate_threshold, config.metric_floor);
//!
//!     let generator = DigestGenerator::new(retriever, context_source, synthesizer, evaluator, config);
//!     let digest = generator.generate("user-1", "transformer attention", DigestMode::Digest).await;
//!     println!("{} insights, badge: {}", digest.insights.len(), digest.badge);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod digest;
pub mod error;
pub mod evaluation;
pub mod retrieval;
pub mod services;
pub mod synthesis;
pub mod types;

// Re-export commonly used types
pub use config::DigestConfig;
pub use digest::DigestGenerator;
pub use error::{DigestError, Result};
pub use evaluation::{Evaluator, LlmJudge, MetricsEngine, ScoringBackend, FALLBACK_SCORE};
pub use retrieval::{ContextSource, Retriever};
pub use services::{HttpLlmClient, LlmClient, LlmConfig, LlmProvider, ModelInfo};
pub use synthesis::{InsightParser, PromptBuilder, SynthesisResult, SynthesisStage, Synthesizer};
pub use types::{
    ContentChunk, Digest, DigestMetadata, DigestMode, Insight, LearningContext, PromptPayload,
    QualityScores, SourceMetadata,
};
