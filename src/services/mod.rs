//! Services layer for the noesis pipeline
//!
//! Provides provider-agnostic LLM invocation.

pub mod llm;

pub use llm::{HttpLlmClient, LlmClient, LlmConfig, LlmProvider, ModelInfo};
