//! Prompt construction for synthesis
//!
//! Template bodies are loaded from disk once per process and cached by name.
//! Rendered payloads are built fresh per call; only the bodies are cached.
//! Placeholders use `{{name}}` so literal JSON braces in template text never
//! collide with substitution.

use crate::error::{DigestError, Result};
use crate::types::{ContentChunk, LearningContext, PromptPayload};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::debug;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

const SYSTEM_TEMPLATE: &str = "synthesis_system";
const SYSTEM_STRICT_TEMPLATE: &str = "synthesis_system_strict";
const USER_TEMPLATE: &str = "synthesis_user";

/// Builds prompts from cached template bodies.
///
/// The cache is populated lazily and idempotently: concurrent first loads of
/// the same template read identical file content, so whichever insert lands
/// first is indistinguishable from the others. The write lock is held only
/// for the insert, never across I/O or an await.
pub struct PromptBuilder {
    templates_dir: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl PromptBuilder {
    /// Create a builder loading templates from `templates_dir`.
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        let templates_dir = templates_dir.into();
        debug!(dir = %templates_dir.display(), "PromptBuilder initialized");
        Self {
            templates_dir,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Render a template with `{{name}}` placeholders substituted.
    ///
    /// A placeholder with no supplied value fails with `MissingVariable`;
    /// a blank is never silently substituted.
    pub fn render(&self, template_name: &str, variables: &HashMap<&str, String>) -> Result<String> {
        let body = self.load_template(template_name)?;

        let mut out = String::with_capacity(body.len());
        let mut last = 0;
        for caps in PLACEHOLDER_RE.captures_iter(&body) {
            let whole = caps.get(0).expect("capture 0 always present");
            let name = &caps[1];
            let value = variables.get(name).ok_or_else(|| DigestError::MissingVariable {
                template: template_name.to_string(),
                name: name.to_string(),
            })?;
            out.push_str(&body[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&body[last..]);

        Ok(out)
    }

    /// Format retrieved chunks into context text for the user prompt.
    ///
    /// Chunks are concatenated in the order received, each annotated with its
    /// chunk id and source, so the parser and evaluator can trace claims back
    /// to chunk ids. An empty slice yields an empty string, not an error; the
    /// caller decides whether empty context is acceptable.
    pub fn build_context_text(&self, chunks: &[ContentChunk]) -> String {
        let mut parts = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            let published = chunk
                .source
                .published_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "N/A".to_string());
            let title = if chunk.source.title.is_empty() {
                "Untitled"
            } else {
                &chunk.source.title
            };
            let author = if chunk.source.author.is_empty() {
                "Unknown"
            } else {
                &chunk.source.author
            };

            parts.push(format!(
                "## Source {n} [chunk:{id}]: {title}\n\n\
                 **Author**: {author}\n\
                 **URL**: {url}\n\
                 **Published**: {published}\n\
                 **Relevance Score**: {sim:.3}\n\n\
                 ### Content:\n{content}\n\n---\n",
                n = i + 1,
                id = chunk.id,
                title = title,
                author = author,
                url = if chunk.source.url.is_empty() { "N/A" } else { &chunk.source.url },
                published = published,
                sim = chunk.similarity,
                content = chunk.text,
            ));
        }

        parts.join("\n")
    }

    /// Build the system/user prompt pair for a synthesis call.
    ///
    /// `stricter` appends the strict-mode suffix template to the system
    /// prompt, used when the quality gate requests a regeneration.
    pub fn build_synthesis_prompt(
        &self,
        context_text: &str,
        learning_context: &LearningContext,
        query: &str,
        num_insights: usize,
        stricter: bool,
    ) -> Result<PromptPayload> {
        let mut system_text = self.load_template(SYSTEM_TEMPLATE)?;
        if stricter {
            system_text.push_str(&self.load_template(SYSTEM_STRICT_TEMPLATE)?);
        }

        let week = learning_context
            .current_week
            .map(|w| w.to_string())
            .unwrap_or_else(|| "N/A".to_string());

        let mut variables: HashMap<&str, String> = HashMap::new();
        variables.insert("current_week", week);
        variables.insert("topics", learning_context.topics_text());
        variables.insert("difficulty", learning_context.difficulty.clone());
        variables.insert("goal", learning_context.goals.clone());
        variables.insert("query", query.to_string());
        variables.insert("context_text", context_text.to_string());
        variables.insert("num_insights", num_insights.to_string());

        let user_text = self.render(USER_TEMPLATE, &variables)?;

        Ok(PromptPayload {
            system_text,
            user_text,
        })
    }

    /// Load a template body, caching by name.
    fn load_template(&self, template_name: &str) -> Result<String> {
        {
            let cache = self.cache.read().expect("template cache poisoned");
            if let Some(body) = cache.get(template_name) {
                return Ok(body.clone());
            }
        }

        let path = self.templates_dir.join(format!("{}.txt", template_name));
        if !path.exists() {
            return Err(DigestError::TemplateNotFound(path.display().to_string()));
        }
        let body = std::fs::read_to_string(&path)?;

        debug!(template = template_name, "Loaded template");

        let mut cache = self.cache.write().expect("template cache poisoned");
        // First writer wins; a concurrent load read the same file anyway
        Ok(cache.entry(template_name.to_string()).or_insert(body).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn template_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("synthesis_system.txt"),
            "You synthesize learning insights.\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("synthesis_system_strict.txt"),
            "\nOnly claims directly supported by the sources.\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("synthesis_user.txt"),
            "Week {{current_week}}, topics: {{topics}} ({{difficulty}}).\n\
             Goal: {{goal}}\nQuery: {{query}}\nGenerate {{num_insights}} insights.\n\
             {{context_text}}",
        )
        .unwrap();
        dir
    }

    fn sample_context() -> LearningContext {
        LearningContext {
            current_week: Some(3),
            topics: vec!["retrieval".into()],
            difficulty: "intermediate".into(),
            goals: "Build a RAG system".into(),
        }
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let dir = template_dir();
        let builder = PromptBuilder::new(dir.path());
        let mut vars = HashMap::new();
        vars.insert("current_week", "3".to_string());
        vars.insert("topics", "retrieval".to_string());
        vars.insert("difficulty", "intermediate".to_string());
        vars.insert("goal", "Build a RAG system".to_string());
        vars.insert("query", "chunking strategies".to_string());
        vars.insert("num_insights", "5".to_string());
        vars.insert("context_text", "CTX".to_string());

        let rendered = builder.render("synthesis_user", &vars).unwrap();
        assert!(rendered.contains("Week 3, topics: retrieval (intermediate)."));
        assert!(rendered.contains("Generate 5 insights."));
        assert!(rendered.ends_with("CTX"));
    }

    #[test]
    fn test_render_missing_variable_fails() {
        let dir = template_dir();
        let builder = PromptBuilder::new(dir.path());
        let vars = HashMap::new();
        let err = builder.render("synthesis_user", &vars).unwrap_err();
        assert!(matches!(err, DigestError::MissingVariable { .. }));
    }

    #[test]
    fn test_missing_template_fails() {
        let dir = template_dir();
        let builder = PromptBuilder::new(dir.path());
        let err = builder.render("nonexistent", &HashMap::new()).unwrap_err();
        assert!(matches!(err, DigestError::TemplateNotFound(_)));
    }

    #[test]
    fn test_template_cache_survives_file_change() {
        let dir = template_dir();
        let builder = PromptBuilder::new(dir.path());

        let first = builder
            .build_synthesis_prompt("ctx", &sample_context(), "q", 3, false)
            .unwrap();

        // Rewriting the file must not change the cached body
        fs::write(dir.path().join("synthesis_system.txt"), "changed").unwrap();
        let second = builder
            .build_synthesis_prompt("ctx", &sample_context(), "q", 3, false)
            .unwrap();
        assert_eq!(first.system_text, second.system_text);
    }

    #[test]
    fn test_stricter_appends_suffix() {
        let dir = template_dir();
        let builder = PromptBuilder::new(dir.path());

        let normal = builder
            .build_synthesis_prompt("ctx", &sample_context(), "q", 3, false)
            .unwrap();
        let strict = builder
            .build_synthesis_prompt("ctx", &sample_context(), "q", 3, true)
            .unwrap();

        assert!(strict.system_text.starts_with(&normal.system_text));
        assert!(strict.system_text.contains("directly supported"));
    }

    #[test]
    fn test_build_context_text_empty_is_empty_string() {
        let dir = template_dir();
        let builder = PromptBuilder::new(dir.path());
        assert_eq!(builder.build_context_text(&[]), "");
    }

    #[test]
    fn test_build_context_text_annotates_ids_in_order() {
        let dir = template_dir();
        let builder = PromptBuilder::new(dir.path());
        let chunks = vec![
            ContentChunk::new("c-9", "first text", 0.91),
            ContentChunk::new("c-2", "second text", 0.74),
        ];

        let text = builder.build_context_text(&chunks);
        let first = text.find("[chunk:c-9]").unwrap();
        let second = text.find("[chunk:c-2]").unwrap();
        assert!(first < second, "chunks must keep the order received");
        assert!(text.contains("## Source 1"));
        assert!(text.contains("## Source 2"));
        assert!(text.contains("first text"));
    }

    #[test]
    fn test_json_braces_in_template_are_untouched() {
        let dir = template_dir();
        fs::write(
            dir.path().join("with_json.txt"),
            "Respond as {\"insights\": []} for {{query}}",
        )
        .unwrap();
        let builder = PromptBuilder::new(dir.path());
        let mut vars = HashMap::new();
        vars.insert("query", "x".to_string());
        let rendered = builder.render("with_json", &vars).unwrap();
        assert_eq!(rendered, "Respond as {\"insights\": []} for x");
    }
}
