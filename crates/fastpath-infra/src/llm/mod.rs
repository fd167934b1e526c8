//! Model backend implementations.
//!
//! Contains the Gemini implementation of the [`ModelClient`] and
//! [`ContextCache`](fastpath_core::llm::cache::ContextCache) ports defined in
//! `fastpath-core`, plus [`build_engine`], which wires a ready
//! [`FastPathEngine`] from loaded settings.

pub mod gemini;

use std::sync::Arc;

use anyhow::Context;

use fastpath_core::agent::engine::FastPathEngine;
use fastpath_core::llm::cache::BoxContextCache;
use fastpath_core::llm::client::ModelClient;
use fastpath_core::tool::registry::ToolRegistry;

use crate::config::FastpathSettings;

use self::gemini::{GeminiClient, GeminiContextCache};

/// Build an engine backed by Gemini.
///
/// A missing API key is not an error: the engine is still built, and every
/// request is then reported ineligible so callers use their normal path.
pub fn build_engine<C: Send + Sync>(
    settings: &FastpathSettings,
    tools: ToolRegistry<C>,
) -> anyhow::Result<FastPathEngine<C>> {
    let client = GeminiClient::new(&settings.gemini).context("failed to create Gemini client")?;
    let cache =
        GeminiContextCache::new(&settings.gemini).context("failed to create Gemini context cache")?;

    if !client.is_available() {
        tracing::warn!("GEMINI_API_KEY is not set, fast path will report every request ineligible");
    }

    let client: Arc<dyn ModelClient> = Arc::new(client);
    Ok(FastPathEngine::new(settings.engine.clone(), client, tools)
        .with_cache(BoxContextCache::new(cache)))
}
