//! Configuration for the noesis digest pipeline
//!
//! Settings are layered: built-in defaults, an optional TOML file, then
//! `NOESIS_`-prefixed environment variables. Provider credentials are read
//! from the process environment only and are never embedded in prompt text.

use crate::error::{DigestError, Result};
use crate::services::llm::LlmProvider;
use crate::types::DigestMode;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Configuration surface recognized by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// LLM provider used for synthesis and metric judging
    pub provider: LlmProvider,

    /// Model identifier override; each provider has a sensible default
    pub model_id: Option<String>,

    /// Minimum average score for the quality gate
    pub gate_threshold: f64,

    /// Minimum any single metric may score without failing the gate
    pub metric_floor: f64,

    /// Number of chunks requested from the retriever in digest mode
    pub top_k: usize,

    /// Minimum similarity a chunk must clear to be retrieved
    pub similarity_threshold: f64,

    /// Default pipeline mode
    pub mode: DigestMode,

    /// Number of insights requested per synthesis (capped at 10)
    pub num_insights: usize,

    /// Sampling temperature for synthesis
    pub temperature: f32,

    /// Completion token budget for synthesis
    pub max_tokens: u32,

    /// Directory containing prompt template files
    pub templates_dir: PathBuf,

    /// Stricter re-synthesis attempts allowed when the gate fails
    pub max_gate_retries: u32,

    /// Skip metric scoring entirely (fast path; digest is badged "unscored")
    pub skip_evaluation: bool,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            model_id: None,
            gate_threshold: 0.70,
            metric_floor: 0.50,
            top_k: 15,
            similarity_threshold: 0.30,
            mode: DigestMode::Digest,
            num_insights: 7,
            temperature: 0.3,
            max_tokens: 8000,
            templates_dir: PathBuf::from("templates"),
            max_gate_retries: 2,
            skip_evaluation: false,
        }
    }
}

impl DigestConfig {
    /// Load configuration from defaults, an optional file, and the
    /// `NOESIS_` environment prefix (environment wins).
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("NOESIS").try_parsing(true))
            .build()?;

        // serde(default) on the struct lets sparse files/env override only
        // what they name
        let cfg: DigestConfig = settings.try_deserialize().map_err(DigestError::Config)?;

        cfg.validate()?;
        debug!(provider = %cfg.provider, model = %cfg.resolved_model_id(), "Configuration loaded");
        Ok(cfg)
    }

    /// Check threshold and count sanity once, up front.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("gate_threshold", self.gate_threshold),
            ("metric_floor", self.metric_floor),
            ("similarity_threshold", self.similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DigestError::Config(config::ConfigError::Message(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                ))));
            }
        }
        if self.top_k == 0 {
            return Err(DigestError::Config(config::ConfigError::Message(
                "top_k must be at least 1".to_string(),
            )));
        }
        if self.num_insights == 0 {
            return Err(DigestError::Config(config::ConfigError::Message(
                "num_insights must be at least 1".to_string(),
            )));
        }
        if self.metric_floor > self.gate_threshold {
            warn!(
                floor = self.metric_floor,
                threshold = self.gate_threshold,
                "metric_floor exceeds gate_threshold; the floor will dominate gating"
            );
        }
        Ok(())
    }

    /// Model identifier, falling back to the provider default.
    pub fn resolved_model_id(&self) -> String {
        match &self.model_id {
            Some(id) => id.clone(),
            None => self.provider.default_model().to_string(),
        }
    }

    /// API key for the configured provider, from the process environment.
    pub fn api_key(&self) -> Result<String> {
        let var = self.provider.api_key_var();
        match env::var(var) {
            Ok(key) if !key.is_empty() => {
                debug!("Using API key from {} environment variable", var);
                Ok(key)
            }
            _ => Err(DigestError::Config(config::ConfigError::Message(format!(
                "{} not set; the {} provider needs a credential",
                var, self.provider
            )))),
        }
    }

    /// Number of insights to request, clamped to the pipeline cap.
    pub fn capped_num_insights(&self) -> usize {
        self.num_insights.min(10)
    }
}
