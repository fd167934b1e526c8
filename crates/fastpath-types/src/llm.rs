//! Model request/response types for the fastpath engine.
//!
//! These types model the data shapes for one streaming model call:
//! conversation contents, the system instruction (inline or cached),
//! tool sets, incremental stream chunks, usage metadata, and errors.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tool::ToolDeclaration;

/// Author of a conversation turn.
///
/// The provider protocol only knows two roles; function responses travel
/// in `User` turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "model" | "assistant" => Ok(Role::Model),
            other => Err(format!("invalid role: '{other}'")),
        }
    }
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Opaque provider continuation part.
///
/// Providers attach continuity state (e.g. thought signatures) to the parts
/// of a function-call turn. The engine stores these and replays them
/// unmodified on the next round; the payload is never parsed outside the
/// provider that produced it. `call_name` is set by the provider when the
/// part carries a function call, so batches can be truncated per name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPart {
    pub call_name: Option<String>,
    pub payload: Arc<str>,
}

impl RawPart {
    pub fn new(call_name: Option<String>, payload: impl Into<Arc<str>>) -> Self {
        Self {
            call_name,
            payload: payload.into(),
        }
    }
}

/// One part of a conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse {
        name: String,
        response: serde_json::Value,
    },
    /// Provider part replayed byte-for-byte.
    Raw(RawPart),
}

/// A single turn in the conversation sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text of all `Text` parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Handle to a provider-side cached prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheHandle(pub String);

impl CacheHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the system instruction reaches the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemInstruction {
    /// Full instruction text sent on every call.
    Inline(String),
    /// Reference to a cached prefix that already contains the instruction.
    ///
    /// `inline` is the same instruction as text, for providers that cannot
    /// combine a cached prefix with the tools of a particular request.
    Cached { handle: CacheHandle, inline: String },
}

impl SystemInstruction {
    pub fn cache_handle(&self) -> Option<&CacheHandle> {
        match self {
            SystemInstruction::Inline(_) => None,
            SystemInstruction::Cached { handle, .. } => Some(handle),
        }
    }

    /// The full instruction text, whichever way it is delivered.
    pub fn text(&self) -> &str {
        match self {
            SystemInstruction::Inline(text) => text,
            SystemInstruction::Cached { inline, .. } => inline,
        }
    }
}

/// A group of tools offered to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolSet {
    Functions(Vec<ToolDeclaration>),
    /// Provider-hosted web search grounding.
    WebSearch,
}

/// Request for one streaming model call.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub model: String,
    pub instruction: SystemInstruction,
    pub contents: Vec<Content>,
    /// Empty means the request carries no tools field at all.
    pub tools: Vec<ToolSet>,
}

impl StreamRequest {
    pub fn has_function_tools(&self) -> bool {
        self.tools
            .iter()
            .any(|t| matches!(t, ToolSet::Functions(decls) if !decls.is_empty()))
    }
}

/// Token usage reported by the provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: u32,
    pub response_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u32>,
}

/// One incremental chunk of a streaming model response.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    pub text_delta: Option<String>,
    pub function_calls: Vec<FunctionCall>,
    pub raw_parts: Vec<RawPart>,
    pub usage: Option<UsageMetadata>,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text_delta: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn calls(calls: Vec<FunctionCall>) -> Self {
        Self {
            function_calls: calls,
            ..Default::default()
        }
    }

    pub fn usage(usage: UsageMetadata) -> Self {
        Self {
            usage: Some(usage),
            ..Default::default()
        }
    }
}

/// Errors from model provider operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("provider overloaded: {0}")]
    Overloaded(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("model client unavailable")]
    Unavailable,
}
