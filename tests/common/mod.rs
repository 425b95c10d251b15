//! Shared fixtures and mock collaborators for pipeline integration tests.

use async_trait::async_trait;
use noesis::{
    ContentChunk, ContextSource, DigestConfig, DigestError, LearningContext, LlmClient,
    LlmProvider, ModelInfo, Retriever, ScoringBackend,
};
use std::collections::VecDeque;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// Install a test subscriber so `RUST_LOG` surfaces pipeline events.
/// Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Write the synthesis templates into a fresh temp directory.
pub fn template_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("synthesis_system.txt"),
        "Synthesize grounded insights as JSON.",
    )
    .unwrap();
    fs::write(
        dir.path().join("synthesis_system_strict.txt"),
        "\nSTRICT: only directly supported claims.",
    )
    .unwrap();
    fs::write(
        dir.path().join("synthesis_user.txt"),
        "Week {{current_week}} | {{topics}} | {{difficulty}} | {{goal}}\n\
         Query: {{query}}\nCount: {{num_insights}}\n\n{{context_text}}",
    )
    .unwrap();
    dir
}

pub fn test_config(templates: &TempDir) -> DigestConfig {
    DigestConfig {
        templates_dir: templates.path().to_path_buf(),
        ..DigestConfig::default()
    }
}

pub fn sample_chunks() -> Vec<ContentChunk> {
    vec![
        ContentChunk::new("c1", "Attention weighs token relevance dynamically.", 0.92),
        ContentChunk::new("c2", "Retrieval quality bounds generation quality.", 0.81),
        ContentChunk::new("c3", "Chunk overlap trades recall for index size.", 0.65),
    ]
}

pub fn insights_json() -> String {
    serde_json::json!({
        "insights": [
            {
                "claim": "Attention mechanisms weigh token relevance dynamically.",
                "supporting_chunk_ids": ["c1"],
                "confidence": 0.9
            },
            {
                "claim": "Better retrieval directly improves generated answers.",
                "supporting_chunk_ids": ["c2", "c3"],
                "confidence": 0.8
            }
        ]
    })
    .to_string()
}

/// What the scripted LLM should do on a given call.
#[derive(Clone)]
pub enum LlmScript {
    Text(String),
    NullContent,
    EmptyResponse,
}

/// LLM fake that plays back a script and counts invocations.
///
/// The last script entry repeats once the queue drains.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<LlmScript>>,
    last: LlmScript,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(script: Vec<LlmScript>) -> Self {
        let last = script.last().cloned().expect("script must not be empty");
        Self {
            script: Mutex::new(script.into()),
            last,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(script: LlmScript) -> Self {
        Self::new(vec![script])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, _system: &str, _user: &str) -> noesis::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock().unwrap();
            script.pop_front().unwrap_or_else(|| self.last.clone())
        };
        match step {
            LlmScript::Text(text) => Ok(text),
            LlmScript::NullContent => Err(DigestError::NullContent("openai".to_string())),
            LlmScript::EmptyResponse => Err(DigestError::EmptyResponse("openai".to_string())),
        }
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: LlmProvider::OpenAi,
            model: "scripted-model".to_string(),
        }
    }
}

/// Retriever fake that records the parameters it was called with.
pub struct StaticRetriever {
    chunks: Vec<ContentChunk>,
    fail: bool,
    pub last_call: Mutex<Option<(usize, f64)>>,
    calls: AtomicUsize,
}

impl StaticRetriever {
    pub fn with_chunks(chunks: Vec<ContentChunk>) -> Self {
        Self {
            chunks,
            fail: false,
            last_call: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::with_chunks(vec![])
    }

    pub fn failing() -> Self {
        Self {
            chunks: vec![],
            fail: true,
            last_call: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(
        &self,
        _query: &str,
        _user_id: &str,
        top_k: usize,
        similarity_threshold: f64,
    ) -> noesis::Result<Vec<ContentChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_call.lock().unwrap() = Some((top_k, similarity_threshold));
        if self.fail {
            return Err(DigestError::Validation(
                "vector store unreachable".to_string(),
            ));
        }
        Ok(self
            .chunks
            .iter()
            .filter(|c| c.similarity >= similarity_threshold)
            .take(top_k)
            .cloned()
            .collect())
    }
}

/// Context source returning a fixed learning context.
pub struct StaticContext(pub LearningContext);

impl StaticContext {
    pub fn default_learner() -> Self {
        Self(LearningContext {
            current_week: Some(6),
            topics: vec!["retrieval-augmented generation".to_string()],
            difficulty: "intermediate".to_string(),
            goals: "Build production RAG systems".to_string(),
        })
    }
}

#[async_trait]
impl ContextSource for StaticContext {
    async fn learning_context(&self, _user_id: &str) -> noesis::Result<LearningContext> {
        Ok(self.0.clone())
    }
}

/// Context source with nothing stored for any user.
pub struct MissingContext;

#[async_trait]
impl ContextSource for MissingContext {
    async fn learning_context(&self, user_id: &str) -> noesis::Result<LearningContext> {
        Err(DigestError::Validation(format!(
            "no learning context for {}",
            user_id
        )))
    }
}

/// Scoring backend returning one score for the first evaluation and another
/// afterwards (each evaluation makes exactly three metric calls).
pub struct SteppedBackend {
    first: f64,
    later: f64,
    calls: AtomicUsize,
}

impl SteppedBackend {
    pub fn new(first: f64, later: f64) -> Self {
        Self {
            first,
            later,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn uniform(score: f64) -> Self {
        Self::new(score, score)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> f64 {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < 3 {
            self.first
        } else {
            self.later
        }
    }
}

#[async_trait]
impl ScoringBackend for SteppedBackend {
    async fn faithfulness(&self, _q: &str, _r: &str, _c: &[String]) -> noesis::Result<f64> {
        Ok(self.next())
    }
    async fn context_precision(&self, _q: &str, _r: &str, _c: &[String]) -> noesis::Result<f64> {
        Ok(self.next())
    }
    async fn context_recall(&self, _q: &str, _r: &str, _c: &[String]) -> noesis::Result<f64> {
        Ok(self.next())
    }
}
