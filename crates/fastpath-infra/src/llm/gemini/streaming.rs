//! SSE stream creation and chunk mapping for Gemini `streamGenerateContent`.
//!
//! With `alt=sse` every event's `data:` is a complete
//! `GenerateContentResponse`. Each one maps to exactly one [`StreamChunk`]:
//! - non-thought text parts are concatenated into `text_delta`
//! - `functionCall` parts become function calls, and the whole part is kept
//!   as a named [`RawPart`] so its thought signature can be replayed
//! - thought parts and signature-carrying text parts become unnamed raw parts
//! - `usageMetadata` (cumulative) becomes `usage`

use std::time::Duration;

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};

use fastpath_core::llm::client::ChunkStream;
use fastpath_types::llm::{FunctionCall, LlmError, RawPart, StreamChunk, UsageMetadata};

use super::types::{ErrorEnvelope, GenerateContentRequest, GenerateContentResponse, PartView, WireError};

/// Longest gap tolerated between two SSE events.
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Map one SSE `data:` payload to a stream chunk.
pub fn parse_chunk(data: &str) -> Result<StreamChunk, LlmError> {
    let response: GenerateContentResponse = serde_json::from_str(data)
        .map_err(|e| LlmError::Deserialization(format!("stream chunk: {e}")))?;

    if let Some(error) = response.error {
        return Err(map_api_error(error, None));
    }

    let mut chunk = StreamChunk::default();
    let mut text = String::new();

    // Only the first candidate is ever requested.
    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    for part in parts {
        let view: PartView = serde_json::from_str(part.get())
            .map_err(|e| LlmError::Deserialization(format!("response part: {e}")))?;

        if let Some(call) = view.function_call {
            let args = if call.args.is_null() {
                serde_json::json!({})
            } else {
                call.args
            };
            chunk
                .raw_parts
                .push(RawPart::new(Some(call.name.clone()), part.get()));
            chunk.function_calls.push(FunctionCall::new(call.name, args));
            continue;
        }

        if view.thought || view.thought_signature.is_some() {
            chunk.raw_parts.push(RawPart::new(None, part.get()));
        }
        if !view.thought {
            if let Some(t) = view.text {
                text.push_str(&t);
            }
        }
    }

    if !text.is_empty() {
        chunk.text_delta = Some(text);
    }
    chunk.usage = response.usage_metadata.map(|u| UsageMetadata {
        prompt_tokens: u.prompt_token_count,
        response_tokens: u.candidates_token_count,
        cached_tokens: u.cached_content_token_count,
    });

    Ok(chunk)
}

/// Map an HTTP status and error body to an [`LlmError`].
pub fn status_error(status: u16, body: &str, retry_after_ms: Option<u64>) -> LlmError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let mut error = envelope.error;
            error.code = status;
            map_api_error(error, retry_after_ms)
        }
        Err(_) => map_api_error(
            WireError {
                code: status,
                message: body.to_string(),
                status: None,
            },
            retry_after_ms,
        ),
    }
}

fn map_api_error(error: WireError, retry_after_ms: Option<u64>) -> LlmError {
    match (error.code, error.status.as_deref()) {
        (400, _) | (_, Some("INVALID_ARGUMENT")) => LlmError::InvalidRequest(error.message),
        (401 | 403, _) | (_, Some("UNAUTHENTICATED" | "PERMISSION_DENIED")) => {
            LlmError::AuthenticationFailed
        }
        (429, _) | (_, Some("RESOURCE_EXHAUSTED")) => LlmError::RateLimited { retry_after_ms },
        (503, _) | (_, Some("UNAVAILABLE")) => LlmError::Overloaded(error.message),
        (code, _) => LlmError::Provider {
            message: format!("HTTP {code}: {}", error.message),
        },
    }
}

fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000)
}

/// Create a streaming SSE connection to `streamGenerateContent`.
///
/// Nothing is sent until the stream is first polled. HTTP failures,
/// transport errors and in-band error payloads all surface as `Err` items;
/// the stream ends after the first error.
pub fn create_gemini_stream(
    client: &reqwest::Client,
    url: &str,
    body: GenerateContentRequest,
    api_key: &SecretString,
) -> ChunkStream {
    let client = client.clone();
    let url = url.to_string();
    let api_key = api_key.expose_secret().to_string();

    Box::pin(async_stream::try_stream! {
        let response = client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        let response = if !status.is_success() {
            let retry_after = retry_after_ms(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %error_body, "Gemini stream API error response");
            Err::<(), _>(status_error(status.as_u16(), &error_body, retry_after))?;
            unreachable!()
        } else {
            response
        };

        let mut events = response.bytes_stream().eventsource();
        loop {
            let event = match tokio::time::timeout(IDLE_TIMEOUT, events.next()).await {
                Ok(Some(event)) => event.map_err(|e| LlmError::Stream(format!("SSE error: {e}")))?,
                Ok(None) => break,
                Err(_) => Err(LlmError::Stream(format!(
                    "no data for {}s",
                    IDLE_TIMEOUT.as_secs()
                )))?,
            };

            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            yield parse_chunk(data)?;
        }
    })
}
