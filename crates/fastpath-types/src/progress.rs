//! Progress events streamed to the caller while a turn runs.

use serde::{Deserialize, Serialize};

/// Kind of progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    /// Partial (or final) answer text.
    Message,
    /// The model started calling a tool.
    ToolUse,
}

/// A partial result delivered to the caller during a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    /// Short preview suitable for a status line. For `ToolUse` this is the tool name.
    pub content: String,
    /// Text added since the previous `Message` event.
    pub delta: String,
    /// Full answer text so far.
    pub snapshot: String,
    pub is_complete: bool,
}
