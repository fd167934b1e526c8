//! System instruction and user message assembly.
//!
//! The system instruction is static per group (base prompt, memory context,
//! fixed rule blocks) and therefore cacheable. Anything that varies per query,
//! such as retrieved knowledge, goes into the user message instead.

/// Line prefix of a follow-up suggestion in the model's answer.
pub const FOLLOW_UP_MARKER: &str = ">>> ";

/// Most follow-up suggestions kept from one answer.
pub const MAX_FOLLOW_UPS: usize = 3;

const FOLLOW_UP_RULES: &str = "\
When it would genuinely help the user, end your answer with 2-3 short follow-up \
questions they might ask next. Put each on its own line starting with \">>> \". \
Skip them for simple acknowledgements or when nothing useful comes to mind.";

const TOOL_RULES: &str = "\
- Only call functions that are declared to you. Never invent function names.
- Only call a function when the user's CURRENT message explicitly asks for that action.
- Never repeat an action from earlier in the conversation unless the user asks for it again now.
- Earlier confirmations in the conversation are history, not instructions.
- When you need an ID you do not have, list or look it up first and wait for the result.";

/// Builds the system instruction using XML tag boundaries.
///
/// Layout:
/// ```text
/// {base prompt}
/// <memory>{memory context}</memory>
/// <follow_up_suggestions>...</follow_up_suggestions>
/// <tool_rules>...</tool_rules>
/// ```
pub struct SystemPromptBuilder;

impl SystemPromptBuilder {
    pub fn build(
        base: &str,
        memory_context: Option<&str>,
        follow_ups: bool,
        function_calling: bool,
    ) -> String {
        let mut sections = Vec::with_capacity(4);
        sections.push(base.trim().to_string());

        if let Some(memory) = memory_context.map(str::trim).filter(|m| !m.is_empty()) {
            sections.push(format!("<memory>\n{memory}\n</memory>"));
        }

        if follow_ups {
            sections.push(format!(
                "<follow_up_suggestions>\n{FOLLOW_UP_RULES}\n</follow_up_suggestions>"
            ));
        }

        if function_calling {
            sections.push(format!("<tool_rules>\n{TOOL_RULES}\n</tool_rules>"));
        }

        sections.join("\n\n")
    }
}

/// The user message for this turn, with retrieved knowledge (already wrapped
/// in its markers) in front of the prompt.
pub fn build_user_message(prompt: &str, knowledge: Option<&str>) -> String {
    match knowledge {
        Some(k) if !k.is_empty() => format!("{k}\n\n{prompt}"),
        _ => prompt.to_string(),
    }
}

/// Separate follow-up suggestion lines from the answer.
///
/// Returns the answer without the marker lines and at most
/// [`MAX_FOLLOW_UPS`] non-empty suggestions.
pub fn split_follow_ups(text: &str) -> (String, Vec<String>) {
    let mut body = Vec::new();
    let mut follow_ups = Vec::new();

    for line in text.lines() {
        match line.trim_start().strip_prefix(FOLLOW_UP_MARKER) {
            Some(rest) => {
                let suggestion = rest.trim();
                if !suggestion.is_empty() && follow_ups.len() < MAX_FOLLOW_UPS {
                    follow_ups.push(suggestion.to_string());
                }
            }
            None => body.push(line),
        }
    }

    (body.join("\n").trim_end().to_string(), follow_ups)
}
