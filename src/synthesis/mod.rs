//! Insight synthesis: prompt construction, LLM invocation, response parsing.

pub mod parser;
pub mod prompt;
pub mod synthesizer;

pub use parser::InsightParser;
pub use prompt::PromptBuilder;
pub use synthesizer::{SynthesisMetadata, SynthesisResult, SynthesisStage, Synthesizer};
