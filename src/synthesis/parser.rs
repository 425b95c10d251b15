//! Structured insight extraction from free-form model output
//!
//! Models are asked for a JSON record but frequently wrap it in markdown
//! fences or commentary. Extraction runs in order of strictness:
//!
//! 1. parse the whole text as JSON;
//! 2. parse the first balanced `{...}` substring;
//! 3. strip code fences and surrounding commentary, then retry 1–2.
//!
//! Candidate insights that claim support from unknown chunk ids, or carry a
//! blank claim, are hallucinated grounding: they are dropped with a logged
//! reason rather than passed through, and dropping them is never fatal.

use crate::error::{DigestError, Result};
use crate::types::Insight;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

/// Parses and validates synthesized insights from LLM responses.
///
/// Purely functional: identical input always yields an identical insight
/// sequence, in the order the insights appeared in the raw response.
#[derive(Debug, Default)]
pub struct InsightParser;

impl InsightParser {
    pub fn new() -> Self {
        Self
    }

    /// Extract insights from `raw_text`, keeping only those whose supporting
    /// chunk ids all resolve against `known_chunk_ids`.
    ///
    /// Returns `Ok(vec![])` when every candidate is invalid; fails with
    /// `UnparseableResponse` only when no structured record can be extracted
    /// at all.
    pub fn parse(&self, raw_text: &str, known_chunk_ids: &HashSet<String>) -> Result<Vec<Insight>> {
        let record = self.extract_json(raw_text)?;

        let insights = record
            .get("insights")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                DigestError::UnparseableResponse(format!(
                    "record has no 'insights' array: {}",
                    truncate(raw_text, 200)
                ))
            })?;

        let mut parsed = Vec::with_capacity(insights.len());
        for (idx, candidate) in insights.iter().enumerate() {
            match Self::validate_insight(candidate, known_chunk_ids) {
                Ok(insight) => parsed.push(insight),
                Err(reason) => {
                    warn!(index = idx, %reason, "Dropping invalid insight");
                }
            }
        }

        debug!(
            parsed = parsed.len(),
            candidates = insights.len(),
            "Parsed insights from response"
        );

        Ok(parsed)
    }

    /// Run the extraction strategies in order of strictness.
    fn extract_json(&self, raw_text: &str) -> Result<Value> {
        // Strategy 1: the whole response is the record
        if let Ok(value) = serde_json::from_str::<Value>(raw_text.trim()) {
            if value.is_object() {
                return Ok(value);
            }
        }

        // Strategy 2: first balanced object substring
        if let Some(candidate) = balanced_object(raw_text) {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Ok(value);
            }
        }

        // Strategy 3: lenient recovery — strip fences, retry
        if let Some(caps) = FENCE_RE.captures(raw_text) {
            let inner = caps.get(1).expect("fence capture").as_str();
            if let Ok(value) = serde_json::from_str::<Value>(inner) {
                return Ok(value);
            }
            if let Some(candidate) = balanced_object(inner) {
                if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                    return Ok(value);
                }
            }
        }

        Err(DigestError::UnparseableResponse(truncate(raw_text, 200)))
    }

    /// Validate one candidate, returning the drop reason on failure.
    fn validate_insight(
        candidate: &Value,
        known_chunk_ids: &HashSet<String>,
    ) -> std::result::Result<Insight, String> {
        let obj = candidate.as_object().ok_or("candidate is not an object")?;

        let claim = obj
            .get("claim")
            .and_then(Value::as_str)
            .ok_or("missing 'claim' field")?;
        if claim.trim().is_empty() {
            return Err("blank claim".to_string());
        }

        let mut ids = BTreeSet::new();
        if let Some(raw_ids) = obj.get("supporting_chunk_ids") {
            let array = raw_ids
                .as_array()
                .ok_or("'supporting_chunk_ids' is not an array")?;
            for raw in array {
                let id = raw.as_str().ok_or("non-string chunk id")?;
                if !known_chunk_ids.contains(id) {
                    return Err(format!("unknown supporting chunk id '{}'", id));
                }
                ids.insert(id.to_string());
            }
        }

        let confidence = obj
            .get("confidence")
            .and_then(Value::as_f64)
            .map(|c| c.clamp(0.0, 1.0));

        Ok(Insight {
            claim: claim.trim().to_string(),
            supporting_chunk_ids: ids,
            confidence,
        })
    }
}

/// Locate the first balanced `{...}` substring, aware of JSON strings and
/// escapes so braces inside string values do not confuse the depth count.
fn balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let cut = text
            .char_indices()
            .take_while(|(i, _)| *i < max)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &text[..cut])
    }
}
