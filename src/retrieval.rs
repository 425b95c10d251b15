//! Retrieval collaborator boundary
//!
//! The vector store and its embedding/similarity-search implementation live
//! outside this crate; the pipeline only depends on this contract. Concrete
//! retrievers are injected into [`crate::digest::DigestGenerator`] at
//! construction.

use crate::error::Result;
use crate::types::{ContentChunk, LearningContext};
use async_trait::async_trait;

/// Supplies ranked content chunks for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve chunks relevant to `query` for `user_id`.
    ///
    /// Contract: at most `top_k` chunks, each with similarity at or above
    /// `similarity_threshold`, sorted by descending similarity. An empty
    /// result is an expected non-error outcome meaning no chunk cleared the
    /// threshold; the pipeline short-circuits to a "no content" digest.
    async fn retrieve(
        &self,
        query: &str,
        user_id: &str,
        top_k: usize,
        similarity_threshold: f64,
    ) -> Result<Vec<ContentChunk>>;
}

/// Supplies the user's current learning context.
///
/// Backed by whatever profile store the host application uses; the pipeline
/// passes the context through to prompts unmodified.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn learning_context(&self, user_id: &str) -> Result<LearningContext>;
}
