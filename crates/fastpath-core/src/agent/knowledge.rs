//! Per-query knowledge retrieval.
//!
//! Knowledge varies with every query, so it is fetched fresh each turn and
//! prepended to the user message. It never enters the cached system
//! instruction. Retrieval is best-effort: any failure yields no knowledge.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::text::truncate_chars;

pub const KNOWLEDGE_START: &str = "[RELEVANT KNOWLEDGE]";
pub const KNOWLEDGE_END: &str = "[END KNOWLEDGE]";

/// Errors from a knowledge source. Always swallowed by the engine.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("knowledge backend error: {0}")]
    Backend(String),

    #[error("knowledge query failed: {0}")]
    Query(String),
}

/// Source of documents relevant to a query, scoped to one group.
pub trait KnowledgeSource: Send + Sync {
    /// Relevant text for `query`, or an empty string when nothing matches.
    fn relevant(
        &self,
        query: &str,
        group_id: &str,
    ) -> impl Future<Output = Result<String, KnowledgeError>> + Send;
}

/// Object-safe version of [`KnowledgeSource`] with boxed futures.
pub trait KnowledgeSourceDyn: Send + Sync {
    fn relevant_boxed<'a>(
        &'a self,
        query: &'a str,
        group_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, KnowledgeError>> + Send + 'a>>;
}

impl<T: KnowledgeSource> KnowledgeSourceDyn for T {
    fn relevant_boxed<'a>(
        &'a self,
        query: &'a str,
        group_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, KnowledgeError>> + Send + 'a>> {
        Box::pin(self.relevant(query, group_id))
    }
}

/// Type-erased knowledge source.
pub struct BoxKnowledgeSource {
    inner: Box<dyn KnowledgeSourceDyn + Send + Sync>,
}

impl BoxKnowledgeSource {
    pub fn new<T: KnowledgeSource + 'static>(source: T) -> Self {
        Self {
            inner: Box::new(source),
        }
    }

    pub async fn relevant(&self, query: &str, group_id: &str) -> Result<String, KnowledgeError> {
        self.inner.relevant_boxed(query, group_id).await
    }
}

impl std::fmt::Debug for BoxKnowledgeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxKnowledgeSource").finish_non_exhaustive()
    }
}

/// Source with no documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKnowledge;

impl KnowledgeSource for NoKnowledge {
    async fn relevant(&self, _query: &str, _group_id: &str) -> Result<String, KnowledgeError> {
        Ok(String::new())
    }
}

/// Fetch, truncate and wrap knowledge for one query.
///
/// Returns `None` when the source has nothing or fails.
pub async fn fetch_knowledge(
    source: &BoxKnowledgeSource,
    query: &str,
    group_id: &str,
    max_chars: usize,
) -> Option<String> {
    let text = match source.relevant(query, group_id).await {
        Ok(text) => text,
        Err(e) => {
            debug!(group_id, error = %e, "Knowledge retrieval failed, continuing without it");
            return None;
        }
    };

    let text = truncate_chars(text.trim(), max_chars).trim_end();
    if text.is_empty() {
        return None;
    }
    Some(format!("{KNOWLEDGE_START}\n{text}\n{KNOWLEDGE_END}"))
}
