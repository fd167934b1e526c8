//! Gemini `generateContent` request/response types.
//!
//! Only the fields the engine reads or writes are modeled. Response parts
//! are kept as [`RawValue`] so function-call parts (and the thought
//! signatures attached to them) can be replayed byte-for-byte.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Request body for `models/{model}:streamGenerateContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
pub struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<WirePart>,
}

impl WireContent {
    /// Role-less content carrying a single text part (system instructions).
    pub fn instruction(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![WirePart::Text {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WirePart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: WireFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: WireFunctionResponse,
    },
    /// A part received from the API, sent back untouched.
    Raw(Box<RawValue>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct WireFunctionResponse {
    pub name: String,
    /// Must be a JSON object.
    pub response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WireTool {
    FunctionDeclarations(Vec<WireFunctionDeclaration>),
    GoogleSearch(EmptyObject),
}

#[derive(Debug, Serialize)]
pub struct WireFunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Serializes as `{}`.
#[derive(Debug, Default, Serialize)]
pub struct EmptyObject {}

// ---------------------------------------------------------------------------
// Streaming response
// ---------------------------------------------------------------------------

/// One `data:` payload of the SSE stream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<WireUsage>,
    pub error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<Box<RawValue>>,
}

/// The fields of a response part the engine inspects.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartView {
    pub text: Option<String>,
    #[serde(default)]
    pub thought: bool,
    pub function_call: Option<WireFunctionCall>,
    pub thought_signature: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    pub cached_content_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WireError {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    pub status: Option<String>,
}

/// Error body of a non-2xx response.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: WireError,
}

// ---------------------------------------------------------------------------
// Context cache
// ---------------------------------------------------------------------------

/// Body for `POST cachedContents`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCachedContentRequest {
    /// `models/{model}`.
    pub model: String,
    pub system_instruction: WireContent,
    /// Duration string such as `"3600s"`.
    pub ttl: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedContent {
    /// `cachedContents/{id}`.
    pub name: String,
    pub expire_time: Option<String>,
}
