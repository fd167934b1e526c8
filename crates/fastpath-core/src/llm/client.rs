//! ModelClient trait definition.
//!
//! This is the streaming contract every model backend implements. The
//! `stream` method returns a boxed stream so the trait stays object-safe
//! and the engine can hold an `Arc<dyn ModelClient>`.

use std::pin::Pin;

use futures_util::Stream;

use fastpath_types::llm::{LlmError, StreamChunk, StreamRequest};

/// A lazy, finite, non-restartable stream of chunks for one model call.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LlmError>> + Send + 'static>>;

/// Trait for model backends (Gemini, test doubles, ...).
///
/// Implementations live in fastpath-infra (e.g., `GeminiClient`).
pub trait ModelClient: Send + Sync {
    /// Human-readable backend name (e.g., "gemini").
    fn name(&self) -> &str;

    /// Whether the client is configured and able to serve requests.
    fn is_available(&self) -> bool;

    /// Send a streaming request. Errors surface as stream items.
    fn stream(&self, request: StreamRequest) -> ChunkStream;
}
