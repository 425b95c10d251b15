//! Quality evaluation: grounding metrics and the pass/fail gate.

pub mod evaluator;
pub mod metrics;

pub use evaluator::Evaluator;
pub use metrics::{LlmJudge, MetricOutcome, MetricsEngine, ScoringBackend, FALLBACK_SCORE};
