//! Google Gemini model client.
//!
//! [`GeminiClient`] implements [`ModelClient`] over the
//! `streamGenerateContent` SSE endpoint, and [`GeminiContextCache`]
//! implements the context cache over `cachedContents`.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is only exposed
//! when building request headers.

pub mod cache;
pub mod streaming;
pub mod types;

pub use cache::GeminiContextCache;

use std::time::Duration;

use futures_util::stream;
use secrecy::SecretString;
use serde_json::value::RawValue;

use fastpath_core::llm::client::{ChunkStream, ModelClient};
use fastpath_types::llm::{
    Content, LlmError, Part, StreamChunk, StreamRequest, SystemInstruction, ToolSet,
};

use crate::config::GeminiSettings;

use self::streaming::create_gemini_stream;
use self::types::{
    EmptyObject, GenerateContentRequest, WireContent, WireFunctionCall, WireFunctionDeclaration,
    WireFunctionResponse, WirePart, WireTool,
};

/// Build the shared HTTP client for Gemini endpoints.
pub(crate) fn http_client(settings: &GeminiSettings) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()
        .map_err(|e| LlmError::Provider {
            message: format!("failed to create HTTP client: {e}"),
        })
}

/// Copy the API key out of the settings.
pub(crate) fn api_key(settings: &GeminiSettings) -> Option<SecretString> {
    use secrecy::ExposeSecret;
    settings
        .api_key
        .as_ref()
        .map(|key| SecretString::from(key.expose_secret().to_string()))
}

/// Gemini streaming client.
///
/// Without an API key the client still constructs, but reports itself
/// unavailable and fails every stream with [`LlmError::Unavailable`].
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
}

impl GeminiClient {
    pub fn new(settings: &GeminiSettings) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client(settings)?,
            api_key: api_key(settings),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{model}:streamGenerateContent?alt=sse",
            self.base_url
        )
    }
}

impl ModelClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn stream(&self, request: StreamRequest) -> ChunkStream {
        let Some(api_key) = &self.api_key else {
            return Box::pin(stream::once(async { Err::<StreamChunk, _>(LlmError::Unavailable) }));
        };
        match to_wire_request(&request) {
            Ok(body) => create_gemini_stream(&self.http, &self.stream_url(&request.model), body, api_key),
            Err(e) => Box::pin(stream::once(async move { Err::<StreamChunk, _>(e) })),
        }
    }
}

/// Convert a [`StreamRequest`] into the Gemini wire format.
///
/// The API rejects `cachedContent` combined with `tools` or
/// `systemInstruction`, so a cached instruction is only referenced by handle
/// when the request carries no tools; otherwise its inline text is sent.
pub fn to_wire_request(request: &StreamRequest) -> Result<GenerateContentRequest, LlmError> {
    let contents = request
        .contents
        .iter()
        .map(to_wire_content)
        .collect::<Result<Vec<_>, _>>()?;

    let tools: Vec<WireTool> = request
        .tools
        .iter()
        .filter_map(|set| match set {
            ToolSet::Functions(decls) if decls.is_empty() => None,
            ToolSet::Functions(decls) => Some(WireTool::FunctionDeclarations(
                decls
                    .iter()
                    .map(|d| WireFunctionDeclaration {
                        name: d.name.clone(),
                        description: d.description.clone(),
                        parameters: d.parameters.clone(),
                    })
                    .collect(),
            )),
            ToolSet::WebSearch => Some(WireTool::GoogleSearch(EmptyObject::default())),
        })
        .collect();

    let (system_instruction, cached_content) = match &request.instruction {
        SystemInstruction::Cached { handle, .. } if tools.is_empty() => {
            (None, Some(handle.as_str().to_string()))
        }
        instruction => (Some(WireContent::instruction(instruction.text())), None),
    };

    Ok(GenerateContentRequest {
        contents,
        system_instruction,
        cached_content,
        tools,
    })
}

fn to_wire_content(content: &Content) -> Result<WireContent, LlmError> {
    let parts = content
        .parts
        .iter()
        .map(|part| {
            Ok(match part {
                Part::Text(text) => WirePart::Text { text: text.clone() },
                Part::FunctionCall(call) => WirePart::FunctionCall {
                    function_call: WireFunctionCall {
                        name: call.name.clone(),
                        args: call.args.clone(),
                    },
                },
                Part::FunctionResponse { name, response } => WirePart::FunctionResponse {
                    function_response: WireFunctionResponse {
                        name: name.clone(),
                        response: as_object(response),
                    },
                },
                Part::Raw(raw) => WirePart::Raw(
                    RawValue::from_string(raw.payload.to_string())
                        .map_err(|e| LlmError::InvalidRequest(format!("raw part: {e}")))?,
                ),
            })
        })
        .collect::<Result<Vec<_>, LlmError>>()?;

    Ok(WireContent {
        role: Some(content.role.to_string()),
        parts,
    })
}

/// `functionResponse.response` must be an object.
fn as_object(value: &serde_json::Value) -> serde_json::Value {
    if value.is_object() {
        value.clone()
    } else {
        serde_json::json!({ "result": value })
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use serde_json::json;

    use fastpath_types::llm::{CacheHandle, FunctionCall, RawPart, Role};
    use fastpath_types::tool::ToolDeclaration;

    use super::*;

    fn declaration() -> ToolDeclaration {
        ToolDeclaration {
            name: "list_tasks".to_string(),
            description: "List scheduled tasks".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    fn cached() -> SystemInstruction {
        SystemInstruction::Cached {
            handle: CacheHandle("cachedContents/abc".to_string()),
            inline: "You are Andy.".to_string(),
        }
    }

    fn request(instruction: SystemInstruction, tools: Vec<ToolSet>) -> StreamRequest {
        StreamRequest {
            model: "gemini-2.5-flash".to_string(),
            instruction,
            contents: vec![Content::user_text("hi")],
            tools,
        }
    }

    #[test]
    fn test_inline_instruction_with_tools() {
        let wire = to_wire_request(&request(
            SystemInstruction::Inline("Be brief.".to_string()),
            vec![ToolSet::Functions(vec![declaration()]), ToolSet::WebSearch],
        ))
        .unwrap();
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be brief.");
        assert_eq!(json["tools"][0]["functionDeclarations"][0]["name"], "list_tasks");
        assert_eq!(json["tools"][1], json!({"googleSearch": {}}));
        assert_eq!(json["contents"][0]["role"], "user");
    }

    #[test]
    fn test_cached_instruction_without_tools_uses_handle() {
        let wire = to_wire_request(&request(cached(), vec![])).unwrap();
        assert_eq!(wire.cached_content.as_deref(), Some("cachedContents/abc"));
        assert!(wire.system_instruction.is_none());
    }

    #[test]
    fn test_cached_instruction_with_tools_falls_back_inline() {
        let wire = to_wire_request(&request(
            cached(),
            vec![ToolSet::Functions(vec![declaration()])],
        ))
        .unwrap();
        assert!(wire.cached_content.is_none());
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "You are Andy.");
    }

    #[test]
    fn test_empty_function_set_is_dropped() {
        let wire = to_wire_request(&request(cached(), vec![ToolSet::Functions(vec![])])).unwrap();
        assert!(wire.tools.is_empty());
        assert!(wire.cached_content.is_some());
    }

    #[test]
    fn test_call_turn_replays_raw_parts_and_wraps_responses() {
        let raw = r#"{"functionCall":{"name":"list_tasks","args":{}},"thoughtSignature":"c2ln"}"#;
        let mut req = request(SystemInstruction::Inline("sys".to_string()), vec![]);
        req.contents.push(Content {
            role: Role::Model,
            parts: vec![Part::Raw(RawPart::new(Some("list_tasks".to_string()), raw))],
        });
        req.contents.push(Content {
            role: Role::User,
            parts: vec![
                Part::FunctionResponse {
                    name: "list_tasks".to_string(),
                    response: json!(["t1", "t2"]),
                },
                Part::FunctionCall(FunctionCall::new("noop", json!({}))),
            ],
        });

        let wire = to_wire_request(&req).unwrap();
        let text = serde_json::to_string(&wire).unwrap();
        assert!(text.contains(raw));

        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(
            json["contents"][2]["parts"][0]["functionResponse"]["response"],
            json!({"result": ["t1", "t2"]})
        );
    }

    #[test]
    fn test_invalid_raw_part_is_rejected() {
        let mut req = request(SystemInstruction::Inline("sys".to_string()), vec![]);
        req.contents.push(Content {
            role: Role::Model,
            parts: vec![Part::Raw(RawPart::new(None, "{broken"))],
        });
        assert!(matches!(
            to_wire_request(&req),
            Err(LlmError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_client_without_key_is_unavailable() {
        let client = GeminiClient::new(&GeminiSettings::default()).unwrap();
        assert_eq!(client.name(), "gemini");
        assert!(!client.is_available());

        let mut stream = client.stream(request(SystemInstruction::Inline("s".to_string()), vec![]));
        assert!(matches!(stream.next().await, Some(Err(LlmError::Unavailable))));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_stream_url() {
        let settings = GeminiSettings {
            api_key: Some(SecretString::from("k".to_string())),
            base_url: "https://example.test/v1beta/".to_string(),
            ..GeminiSettings::default()
        };
        let client = GeminiClient::new(&settings).unwrap();
        assert!(client.is_available());
        assert_eq!(
            client.stream_url("gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }
}
