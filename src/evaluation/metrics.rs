//! Grounding metric computation
//!
//! Faithfulness, context precision, and context recall are computed
//! concurrently against a pluggable scoring backend. Each metric is
//! independent: a failing metric is substituted with a documented fallback
//! score instead of aborting its siblings, and an absent backend degrades
//! every metric to the fallback rather than failing the evaluation.

use crate::error::{DigestError, Result};
use crate::services::llm::LlmClient;
use crate::types::{ContentChunk, Insight, QualityScores};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Score substituted when a metric computation fails or no backend exists
pub const FALLBACK_SCORE: f64 = 0.75;

/// Computes one grounding metric over a (query, response, contexts) sample.
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    /// Factual consistency of the response against the contexts
    async fn faithfulness(&self, query: &str, response: &str, contexts: &[String]) -> Result<f64>;

    /// Relevance of the retrieved contexts to the query
    async fn context_precision(
        &self,
        query: &str,
        response: &str,
        contexts: &[String],
    ) -> Result<f64>;

    /// Coverage of the contexts by the response
    async fn context_recall(&self, query: &str, response: &str, contexts: &[String])
        -> Result<f64>;
}

/// Tagged result of one metric computation.
///
/// Failure-to-fallback is explicit: callers aggregate tagged outcomes
/// instead of catching errors broadly.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    /// The backend produced a score
    Scored(f64),

    /// The computation failed; the fallback value stands in
    Fallback(String),
}

impl MetricOutcome {
    /// Effective score, fallback-substituted when the computation failed
    pub fn value(&self) -> f64 {
        match self {
            MetricOutcome::Scored(v) => v.clamp(0.0, 1.0),
            MetricOutcome::Fallback(_) => FALLBACK_SCORE,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, MetricOutcome::Fallback(_))
    }
}

/// Computes per-digest quality scores, tolerating partial failure.
pub struct MetricsEngine {
    backend: Option<Arc<dyn ScoringBackend>>,
}

impl MetricsEngine {
    /// Engine backed by a scoring implementation
    pub fn new(backend: Arc<dyn ScoringBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Engine with no backend: every metric degrades to the fallback score
    pub fn without_backend() -> Self {
        Self { backend: None }
    }

    /// Score a set of insights against the chunks that produced them.
    ///
    /// Scoring an empty set is meaningless: empty insights or chunks yield
    /// zero scores with a descriptive `error`, without touching the backend
    /// and without propagating an exception.
    pub async fn score(
        &self,
        query: &str,
        insights: &[Insight],
        chunks: &[ContentChunk],
    ) -> QualityScores {
        if insights.is_empty() {
            warn!("No insights to score");
            return QualityScores::zeroed("No insights provided");
        }
        if chunks.is_empty() {
            warn!("No contexts to score against");
            return QualityScores::zeroed("No contexts provided");
        }

        let backend = match &self.backend {
            Some(backend) => Arc::clone(backend),
            None => {
                warn!("Scoring backend unavailable, returning fallback scores");
                let mut scores = QualityScores::uniform(FALLBACK_SCORE);
                scores.error =
                    Some("Scoring backend unavailable; placeholder scores substituted".to_string());
                return scores;
            }
        };

        let response = Self::format_insights(insights);
        let contexts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        // Fan out the three metrics; each failure is tagged independently so
        // no metric's error cancels its siblings.
        let (faithfulness, precision, recall) = tokio::join!(
            Self::run_metric("faithfulness", backend.faithfulness(query, &response, &contexts)),
            Self::run_metric(
                "context_precision",
                backend.context_precision(query, &response, &contexts),
            ),
            Self::run_metric(
                "context_recall",
                backend.context_recall(query, &response, &contexts),
            ),
        );

        let scores = QualityScores {
            faithfulness: faithfulness.value(),
            context_precision: precision.value(),
            context_recall: recall.value(),
            average: (faithfulness.value() + precision.value() + recall.value()) / 3.0,
            error: None,
        };

        info!(
            faithfulness = scores.faithfulness,
            precision = scores.context_precision,
            recall = scores.context_recall,
            average = scores.average,
            "Metric scoring complete"
        );

        scores
    }

    async fn run_metric(
        name: &'static str,
        computation: impl std::future::Future<Output = Result<f64>>,
    ) -> MetricOutcome {
        match computation.await {
            Ok(score) => {
                debug!(metric = name, score, "Metric scored");
                MetricOutcome::Scored(score)
            }
            Err(e) => {
                warn!(metric = name, error = %e, fallback = FALLBACK_SCORE, "Metric failed, substituting fallback");
                MetricOutcome::Fallback(e.to_string())
            }
        }
    }

    /// Concatenate insight claims into a single response text for scoring.
    fn format_insights(insights: &[Insight]) -> String {
        insights
            .iter()
            .map(|i| i.claim.as_str())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }
}

/// LLM-as-judge scoring backend.
///
/// Prompts the configured model once per metric and parses a `SCORE:` line
/// from the reply.
pub struct LlmJudge {
    llm: Arc<dyn LlmClient>,
}

impl LlmJudge {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    async fn judge(&self, instruction: &str, query: &str, response: &str, contexts: &[String]) -> Result<f64> {
        let system = "You are a strict evaluator of retrieval-augmented generation quality. \
                      Score the presented sample on the requested dimension. \
                      Reply with exactly one line in the form:\nSCORE: <value between 0.00 and 1.00>";
        let user = format!(
            "Dimension: {}\n\nQuery:\n{}\n\nGenerated response:\n{}\n\nRetrieved contexts:\n{}",
            instruction,
            query,
            response,
            contexts.join("\n---\n"),
        );

        let reply = self.llm.generate(system, &user).await?;
        Self::parse_score(&reply)
    }

    /// Extract the numeric score from a `SCORE:` line.
    fn parse_score(reply: &str) -> Result<f64> {
        reply
            .lines()
            .find_map(|line| line.trim().strip_prefix("SCORE:"))
            .and_then(|rest| rest.trim().parse::<f64>().ok())
            .map(|score| score.clamp(0.0, 1.0))
            .ok_or_else(|| {
                DigestError::UnparseableResponse(format!(
                    "no SCORE line in judge reply: {}",
                    reply.chars().take(120).collect::<String>()
                ))
            })
    }
}

#[async_trait]
impl ScoringBackend for LlmJudge {
    async fn faithfulness(&self, query: &str, response: &str, contexts: &[String]) -> Result<f64> {
        self.judge(
            "faithfulness — are the response's claims factually supported by the contexts?",
            query,
            response,
            contexts,
        )
        .await
    }

    async fn context_precision(
        &self,
        query: &str,
        response: &str,
        contexts: &[String],
    ) -> Result<f64> {
        self.judge(
            "context precision — how relevant are the retrieved contexts to the query?",
            query,
            response,
            contexts,
        )
        .await
    }

    async fn context_recall(
        &self,
        query: &str,
        response: &str,
        contexts: &[String],
    ) -> Result<f64> {
        self.judge(
            "context recall — how much of the context's key information does the response cover?",
            query,
            response,
            contexts,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    /// Backend with independently scriptable metrics.
    struct ScriptedBackend {
        faithfulness: Result<f64>,
        precision: Result<f64>,
        recall: Result<f64>,
    }

    impl ScriptedBackend {
        fn uniform(score: f64) -> Self {
            Self {
                faithfulness: Ok(score),
                precision: Ok(score),
                recall: Ok(score),
            }
        }
    }

    fn clone_result(r: &Result<f64>) -> Result<f64> {
        match r {
            Ok(v) => Ok(*v),
            Err(e) => Err(DigestError::Validation(e.to_string())),
        }
    }

    #[async_trait]
    impl ScoringBackend for ScriptedBackend {
        async fn faithfulness(&self, _q: &str, _r: &str, _c: &[String]) -> Result<f64> {
            clone_result(&self.faithfulness)
        }
        async fn context_precision(&self, _q: &str, _r: &str, _c: &[String]) -> Result<f64> {
            clone_result(&self.precision)
        }
        async fn context_recall(&self, _q: &str, _r: &str, _c: &[String]) -> Result<f64> {
            clone_result(&self.recall)
        }
    }

    fn insight(claim: &str) -> Insight {
        Insight {
            claim: claim.to_string(),
            supporting_chunk_ids: BTreeSet::from(["c1".to_string()]),
            confidence: None,
        }
    }

    fn chunks() -> Vec<ContentChunk> {
        vec![ContentChunk::new("c1", "context text", 0.9)]
    }

    #[tokio::test]
    async fn test_empty_insights_yields_zeros_and_error() {
        let engine = MetricsEngine::new(Arc::new(ScriptedBackend::uniform(0.9)));
        let scores = engine.score("q", &[], &chunks()).await;
        assert_eq!(scores.average, 0.0);
        assert_eq!(scores.faithfulness, 0.0);
        assert!(!scores.error.as_deref().unwrap_or("").is_empty());
    }

    #[tokio::test]
    async fn test_empty_chunks_yields_zeros_and_error() {
        let engine = MetricsEngine::new(Arc::new(ScriptedBackend::uniform(0.9)));
        let scores = engine.score("q", &[insight("a claim")], &[]).await;
        assert_eq!(scores.average, 0.0);
        assert!(scores.error.is_some());
    }

    #[tokio::test]
    async fn test_missing_backend_degrades_to_fallback() {
        let engine = MetricsEngine::without_backend();
        let scores = engine.score("q", &[insight("a claim")], &chunks()).await;
        assert_eq!(scores.faithfulness, FALLBACK_SCORE);
        assert_eq!(scores.context_precision, FALLBACK_SCORE);
        assert_eq!(scores.context_recall, FALLBACK_SCORE);
        assert_eq!(scores.average, FALLBACK_SCORE);
        assert!(scores.error.as_deref().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_all_metrics_scored() {
        let engine = MetricsEngine::new(Arc::new(ScriptedBackend::uniform(0.9)));
        let scores = engine.score("q", &[insight("a claim")], &chunks()).await;
        assert_eq!(scores.faithfulness, 0.9);
        assert!((scores.average - 0.9).abs() < 1e-9);
        assert!(scores.error.is_none());
    }

    #[tokio::test]
    async fn test_one_failing_metric_gets_fallback_without_aborting_others() {
        let backend = ScriptedBackend {
            faithfulness: Ok(0.9),
            precision: Err(DigestError::Validation("judge timed out".into())),
            recall: Ok(0.6),
        };
        let engine = MetricsEngine::new(Arc::new(backend));
        let scores = engine.score("q", &[insight("a claim")], &chunks()).await;

        assert_eq!(scores.faithfulness, 0.9);
        assert_eq!(scores.context_precision, FALLBACK_SCORE);
        assert_eq!(scores.context_recall, 0.6);
        let expected = (0.9 + FALLBACK_SCORE + 0.6) / 3.0;
        assert!((scores.average - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_out_of_range_backend_score_is_clamped() {
        let engine = MetricsEngine::new(Arc::new(ScriptedBackend::uniform(1.4)));
        let scores = engine.score("q", &[insight("a claim")], &chunks()).await;
        assert_eq!(scores.faithfulness, 1.0);
    }

    #[test]
    fn test_metric_outcome_values() {
        assert_eq!(MetricOutcome::Scored(0.5).value(), 0.5);
        assert_eq!(MetricOutcome::Fallback("reason".into()).value(), FALLBACK_SCORE);
        assert!(MetricOutcome::Fallback("reason".into()).is_fallback());
    }

    #[test]
    fn test_parse_score_normal() {
        assert_eq!(LlmJudge::parse_score("SCORE: 0.85").unwrap(), 0.85);
        assert_eq!(LlmJudge::parse_score("Reasoning...\nSCORE: 0.4\n").unwrap(), 0.4);
    }

    #[test]
    fn test_parse_score_clamps() {
        assert_eq!(LlmJudge::parse_score("SCORE: 1.8").unwrap(), 1.0);
    }

    #[test]
    fn test_parse_score_missing_line() {
        assert!(LlmJudge::parse_score("I think it is quite good.").is_err());
    }

    #[test]
    fn test_format_insights_joins_claims() {
        let text = MetricsEngine::format_insights(&[insight("first"), insight("second")]);
        assert!(text.contains("first"));
        assert!(text.contains("second"));
        assert!(text.contains("---"));
    }
}
