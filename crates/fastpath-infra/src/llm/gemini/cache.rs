//! Gemini `cachedContents` context cache.
//!
//! One entry per (group, model). An entry is reused while the SHA-256
//! fingerprint of the static prefix matches and it is not close to expiry;
//! otherwise a new cached content is created and replaces it. Replaced
//! entries are left to expire server-side.
//!
//! Two concurrent misses for the same key both create a cached content and
//! the last insert wins. The loser is orphaned until its TTL runs out; no
//! lock is taken.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use fastpath_core::llm::cache::ContextCache;
use fastpath_types::llm::{CacheHandle, LlmError};

use crate::config::GeminiSettings;

use super::streaming::status_error;
use super::types::{CachedContent, CreateCachedContentRequest, WireContent};

/// Entries closer than this to expiry are recreated rather than reused.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CacheEntry {
    handle: CacheHandle,
    fingerprint: String,
    expires_at: DateTime<Utc>,
}

/// SHA-256 over everything that ends up in the cached prefix.
pub fn fingerprint(model: &str, system_instruction: &str, memory_context: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0]);
    hasher.update(system_instruction.as_bytes());
    hasher.update([0]);
    hasher.update(memory_context.unwrap_or_default().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct GeminiContextCache {
    http: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    ttl_secs: u64,
    min_chars: usize,
    entries: DashMap<(String, String), CacheEntry>,
}

impl GeminiContextCache {
    pub fn new(settings: &GeminiSettings) -> Result<Self, LlmError> {
        Ok(Self {
            http: super::http_client(settings)?,
            api_key: super::api_key(settings),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            ttl_secs: settings.cache_ttl_secs,
            min_chars: settings.min_cache_chars,
            entries: DashMap::new(),
        })
    }

    /// Number of (group, model) entries currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget the entry for a group, e.g. after its settings changed.
    pub fn invalidate(&self, group_id: &str, model: &str) {
        self.entries
            .remove(&(group_id.to_string(), model.to_string()));
    }

    /// A live entry matching `fingerprint`, if any.
    fn lookup(&self, key: &(String, String), fingerprint: &str) -> Option<CacheHandle> {
        let entry = self.entries.get(key)?;
        let fresh_until = entry.expires_at - chrono::Duration::seconds(REFRESH_MARGIN_SECS);
        (entry.fingerprint == fingerprint && fresh_until > Utc::now())
            .then(|| entry.handle.clone())
    }

    async fn create(
        &self,
        api_key: &SecretString,
        group_id: &str,
        model: &str,
        system_instruction: &str,
    ) -> Result<(CacheHandle, DateTime<Utc>), LlmError> {
        let body = CreateCachedContentRequest {
            model: format!("models/{model}"),
            system_instruction: WireContent::instruction(system_instruction),
            ttl: format!("{}s", self.ttl_secs),
            display_name: Some(format!("fastpath-{group_id}")),
        };

        let response = self
            .http
            .post(format!("{}/cachedContents", self.base_url))
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &error_body, None));
        }

        let created: CachedContent = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("cached content: {e}")))?;

        let expires_at = created
            .expire_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(self.ttl_secs as i64));

        Ok((CacheHandle(created.name), expires_at))
    }

    #[cfg(test)]
    fn remember(&self, group_id: &str, model: &str, entry: CacheEntry) {
        self.entries
            .insert((group_id.to_string(), model.to_string()), entry);
    }
}

impl ContextCache for GeminiContextCache {
    async fn get_or_create(
        &self,
        group_id: &str,
        model: &str,
        system_instruction: &str,
        memory_context: Option<&str>,
    ) -> Option<CacheHandle> {
        let api_key = self.api_key.as_ref()?;
        if system_instruction.chars().count() < self.min_chars {
            tracing::debug!(group = group_id, "System instruction too short to cache");
            return None;
        }

        let key = (group_id.to_string(), model.to_string());
        let fingerprint = fingerprint(model, system_instruction, memory_context);
        if let Some(handle) = self.lookup(&key, &fingerprint) {
            tracing::debug!(group = group_id, cache = %handle, "Context cache hit");
            return Some(handle);
        }

        match self.create(api_key, group_id, model, system_instruction).await {
            Ok((handle, expires_at)) => {
                tracing::info!(group = group_id, cache = %handle, %expires_at, "Created context cache");
                self.entries.insert(
                    key,
                    CacheEntry {
                        handle: handle.clone(),
                        fingerprint,
                        expires_at,
                    },
                );
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(group = group_id, error = %e, "Context cache creation failed, sending instruction inline");
                None
            }
        }
    }
}
