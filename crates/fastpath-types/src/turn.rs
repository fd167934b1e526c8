//! Turn request and result types.
//!
//! `AgentTurnRequest` is everything the engine needs to run one turn;
//! `AgentTurnResult` is the only thing it ever hands back.

use serde::{Deserialize, Serialize};

use crate::llm::Role;

/// A prior turn of the conversation, as persisted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

impl HistoryTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Input for a single conversational turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTurnRequest {
    pub prompt: String,
    pub group_id: String,
    pub chat_id: String,
    /// The main group is offered the administrative tools.
    #[serde(default)]
    pub is_main: bool,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub memory_context: Option<String>,
    #[serde(default)]
    pub web_search_enabled: bool,
    #[serde(default)]
    pub function_calling_disabled: bool,
    #[serde(default)]
    pub conversation_history: Vec<HistoryTurn>,
    /// Images, audio or documents attached to the message.
    #[serde(default)]
    pub has_media: bool,
}

impl AgentTurnRequest {
    pub fn new(
        prompt: impl Into<String>,
        group_id: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            group_id: group_id.into(),
            chat_id: chat_id.into(),
            ..Default::default()
        }
    }
}

/// Terminal status of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Success,
    Error,
}

/// Result of a turn. Always well-formed, even on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTurnResult {
    pub status: TurnStatus,
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Suggested follow-up questions split out of the answer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_ups: Vec<String>,
}

impl AgentTurnResult {
    pub fn success(result: Option<String>) -> Self {
        Self {
            status: TurnStatus::Success,
            result,
            prompt_tokens: None,
            response_tokens: None,
            error: None,
            follow_ups: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: TurnStatus::Error,
            result: None,
            prompt_tokens: None,
            response_tokens: None,
            error: Some(message.into()),
            follow_ups: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TurnStatus::Success
    }
}
