//! Conversation history sanitation.
//!
//! Earlier turns that merely echo an automated tool confirmation are removed
//! before the history is replayed: a model that sees "✅ Task scheduled" in
//! its own past output tends to imitate it and re-trigger the same action on
//! unrelated turns. Only model-authored turns are ever removed.

use fastpath_types::llm::{Content, Role};
use fastpath_types::turn::HistoryTurn;

/// Glyphs that open a canned tool confirmation.
const CONFIRMATION_PREFIXES: &[&str] = &["✅", "⏸️", "▶️", "🗑️", "🔔", "⚙️"];

/// Substrings (lowercase) that mark a short turn as a tool confirmation.
const CONFIRMATION_MARKERS: &[&str] = &[
    "preference updated",
    "task created",
    "task paused",
    "task resumed",
    "task cancelled",
    "task scheduled",
    "task updated",
];

/// Marker substrings only apply to turns of at most this many characters.
const SHORT_TURN_CHARS: usize = 200;

/// Whether a model turn is an artifact of an earlier tool confirmation.
pub fn is_tool_artifact(text: &str) -> bool {
    let trimmed = text.trim_start();
    if CONFIRMATION_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        return true;
    }
    if text.chars().count() > SHORT_TURN_CHARS {
        return false;
    }
    let lower = text.to_lowercase();
    CONFIRMATION_MARKERS.iter().any(|m| lower.contains(m))
}

/// Convert persisted history into model contents.
///
/// Drops tool-confirmation artifacts from model turns and empty turns, then
/// keeps the most recent `max_turns`.
pub fn sanitize_history(history: &[HistoryTurn], max_turns: usize) -> Vec<Content> {
    let kept: Vec<&HistoryTurn> = history
        .iter()
        .filter(|turn| !turn.text.trim().is_empty())
        .filter(|turn| turn.role == Role::User || !is_tool_artifact(&turn.text))
        .collect();

    let skip = kept.len().saturating_sub(max_turns);
    kept.into_iter()
        .skip(skip)
        .map(|turn| match turn.role {
            Role::User => Content::user_text(turn.text.clone()),
            Role::Model => Content::model_text(turn.text.clone()),
        })
        .collect()
}
