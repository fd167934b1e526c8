//! ContextCache -- provider-side cached prefix contract.
//!
//! Follows the same blanket-impl pattern as the other boxed ports:
//! 1. `ContextCache` uses native async fn in traits (RPITIT)
//! 2. An object-safe `ContextCacheDyn` trait with boxed futures
//! 3. `BoxContextCache` wraps `Box<dyn ContextCacheDyn>` and delegates
//!
//! Concurrent turns for the same group and model may both miss and both
//! create a cache entry. That race only wastes a creation call; the engine
//! never relies on handle uniqueness, so implementations do not lock.

use std::future::Future;
use std::pin::Pin;

use fastpath_types::llm::CacheHandle;

/// Obtains a reusable handle for the static prefix of a conversation.
///
/// Returns a stable handle for a given (group, model, fingerprint of the
/// static content) tuple, or `None` when caching is unsupported or not
/// worthwhile. `None` is never an error: the engine then sends the full
/// system instruction inline.
pub trait ContextCache: Send + Sync {
    fn get_or_create(
        &self,
        group_id: &str,
        model: &str,
        system_instruction: &str,
        memory_context: Option<&str>,
    ) -> impl Future<Output = Option<CacheHandle>> + Send;
}

/// Object-safe version of [`ContextCache`] with boxed futures.
pub trait ContextCacheDyn: Send + Sync {
    fn get_or_create_boxed<'a>(
        &'a self,
        group_id: &'a str,
        model: &'a str,
        system_instruction: &'a str,
        memory_context: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Option<CacheHandle>> + Send + 'a>>;
}

impl<T: ContextCache> ContextCacheDyn for T {
    fn get_or_create_boxed<'a>(
        &'a self,
        group_id: &'a str,
        model: &'a str,
        system_instruction: &'a str,
        memory_context: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Option<CacheHandle>> + Send + 'a>> {
        Box::pin(self.get_or_create(group_id, model, system_instruction, memory_context))
    }
}

/// Type-erased context cache for runtime backend selection.
pub struct BoxContextCache {
    inner: Box<dyn ContextCacheDyn + Send + Sync>,
}

impl BoxContextCache {
    pub fn new<T: ContextCache + 'static>(cache: T) -> Self {
        Self {
            inner: Box::new(cache),
        }
    }

    pub async fn get_or_create(
        &self,
        group_id: &str,
        model: &str,
        system_instruction: &str,
        memory_context: Option<&str>,
    ) -> Option<CacheHandle> {
        self.inner
            .get_or_create_boxed(group_id, model, system_instruction, memory_context)
            .await
    }
}

impl std::fmt::Debug for BoxContextCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxContextCache").finish_non_exhaustive()
    }
}

/// Cache that never caches. Every call sends the instruction inline.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl ContextCache for NoCache {
    async fn get_or_create(
        &self,
        _group_id: &str,
        _model: &str,
        _system_instruction: &str,
        _memory_context: Option<&str>,
    ) -> Option<CacheHandle> {
        None
    }
}
