//! Engine configuration types.
//!
//! `EngineConfig` is the immutable configuration injected into the engine at
//! construction. It is loaded from `fastpath.toml` by the infra layer; every
//! field has a sensible default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the fast-path turn engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Global switch for the fast path.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Model identifier used for every call.
    #[serde(default = "default_model")]
    pub model: String,

    /// Deadline for a whole turn, in milliseconds.
    #[serde(default = "default_turn_timeout_ms")]
    pub turn_timeout_ms: u64,

    /// Minimum spacing between throttled `message` progress events.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Maximum function calls executed per round.
    #[serde(default = "default_max_calls_per_turn")]
    pub max_calls_per_turn: usize,

    /// Maximum tool-execution rounds per turn.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Per-query knowledge is truncated to this many characters.
    #[serde(default = "default_knowledge_max_chars")]
    pub knowledge_max_chars: usize,

    /// Most recent history turns sent to the model.
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    /// Ask the model for follow-up question suggestions.
    #[serde(default)]
    pub follow_up_suggestions: bool,

    /// Answer calls dropped from a mixed batch with an explicit "skipped"
    /// function response instead of dropping them silently.
    #[serde(default = "default_notify_skipped_calls")]
    pub notify_skipped_calls: bool,

    /// Base prompt used when the request carries none.
    #[serde(default = "default_system_prompt")]
    pub default_system_prompt: String,
}

fn default_enabled() -> bool {
    true
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_turn_timeout_ms() -> u64 {
    180_000
}

fn default_progress_interval_ms() -> u64 {
    500
}

fn default_max_calls_per_turn() -> usize {
    5
}

fn default_max_tool_rounds() -> usize {
    3
}

fn default_knowledge_max_chars() -> usize {
    4_000
}

fn default_max_history_turns() -> usize {
    40
}

fn default_notify_skipped_calls() -> bool {
    true
}

fn default_system_prompt() -> String {
    "You are a helpful assistant in a group chat. Answer concisely.".to_string()
}

impl EngineConfig {
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            model: default_model(),
            turn_timeout_ms: default_turn_timeout_ms(),
            progress_interval_ms: default_progress_interval_ms(),
            max_calls_per_turn: default_max_calls_per_turn(),
            max_tool_rounds: default_max_tool_rounds(),
            knowledge_max_chars: default_knowledge_max_chars(),
            max_history_turns: default_max_history_turns(),
            follow_up_suggestions: false,
            notify_skipped_calls: default_notify_skipped_calls(),
            default_system_prompt: default_system_prompt(),
        }
    }
}
