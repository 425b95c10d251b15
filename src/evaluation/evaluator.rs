//! Digest evaluation and quality gating
//!
//! Consumes MetricsEngine output, applies the two-condition quality gate,
//! and composes the digest artifact. Data-quality problems (no insights, no
//! chunks) are reported through the digest, never raised.

use crate::evaluation::metrics::MetricsEngine;
use crate::types::{ContentChunk, Digest, DigestMetadata, Insight, QualityScores};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

/// Applies grounding metrics and a pass/fail quality gate to insights.
pub struct Evaluator {
    metrics: MetricsEngine,
    gate_threshold: f64,
    metric_floor: f64,
}

impl Evaluator {
    /// Create an evaluator.
    ///
    /// `gate_threshold` bounds the average score; `metric_floor` bounds each
    /// individual metric so one metric cannot compensate for another's
    /// collapse.
    pub fn new(metrics: MetricsEngine, gate_threshold: f64, metric_floor: f64) -> Self {
        debug!(gate_threshold, metric_floor, "Evaluator initialized");
        Self {
            metrics,
            gate_threshold,
            metric_floor,
        }
    }

    /// Score the insights and compose a digest with the verdict.
    ///
    /// Empty insights or chunks produce a failing digest with zeroed scores
    /// and an explanatory badge; they never raise.
    pub async fn evaluate(
        &self,
        query: &str,
        insights: Vec<Insight>,
        chunks: &[ContentChunk],
    ) -> Digest {
        let quality = self.metrics.score(query, &insights, chunks).await;
        let passed_gate = self.passes_gate(&quality);
        let badge = Self::badge(&quality);

        info!(passed_gate, badge, average = quality.average, "Digest evaluated");

        Digest {
            id: Uuid::new_v4(),
            metadata: DigestMetadata {
                query: query.to_string(),
                mode: None,
                chunk_count: chunks.len(),
                insight_count: insights.len(),
                model_id: None,
                error: quality.error.clone(),
            },
            insights,
            quality,
            passed_gate,
            badge: badge.to_string(),
            generated_at: Utc::now(),
        }
    }

    /// Quality gate: average above threshold AND no metric below the floor.
    pub fn passes_gate(&self, scores: &QualityScores) -> bool {
        if scores.average < self.gate_threshold {
            info!(
                average = scores.average,
                threshold = self.gate_threshold,
                "Quality gate failed on average score"
            );
            return false;
        }

        for (name, value) in [
            ("faithfulness", scores.faithfulness),
            ("context_precision", scores.context_precision),
            ("context_recall", scores.context_recall),
        ] {
            if value < self.metric_floor {
                info!(
                    metric = name,
                    score = value,
                    floor = self.metric_floor,
                    "Quality gate failed on individual metric"
                );
                return false;
            }
        }

        true
    }

    /// Map scores to the fixed badge vocabulary. Pure function of the scores.
    pub fn badge(scores: &QualityScores) -> &'static str {
        let avg = scores.average;
        if avg >= 0.90 {
            "excellent"
        } else if avg >= 0.80 {
            "good"
        } else if avg >= 0.70 {
            "acceptable"
        } else if avg >= 0.60 {
            "needs review"
        } else {
            "failed"
        }
    }
}
