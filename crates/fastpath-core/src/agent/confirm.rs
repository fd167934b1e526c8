//! Deterministic confirmation lines for executed tool calls.
//!
//! Used when the model produced no text after running tools, and to make
//! sure a failed call's error always reaches the user verbatim.

use serde_json::Value;

use fastpath_types::llm::FunctionCall;
use fastpath_types::tool::FunctionCallResult;

/// A call that ran this turn, with its result.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedCall {
    pub call: FunctionCall,
    pub result: FunctionCallResult,
}

fn success_line(call: &FunctionCall) -> String {
    match call.name.as_str() {
        "schedule_task" => "✅ Task scheduled".to_string(),
        "cancel_task" => "🗑️ Task cancelled".to_string(),
        "pause_task" => "⏸️ Task paused".to_string(),
        "resume_task" => "▶️ Task resumed".to_string(),
        "update_task" => "✅ Task updated".to_string(),
        "update_preferences" => match call.args.get("key").and_then(Value::as_str) {
            Some(key) => format!("✅ Preference updated: {key}"),
            None => "✅ Preference updated".to_string(),
        },
        "send_message" => "✅ Message sent".to_string(),
        "register_group" => "⚙️ Group registered".to_string(),
        name => format!("✅ Done: {name}"),
    }
}

/// One line for one executed call. Failures carry the error verbatim.
pub fn confirmation_line(executed: &ExecutedCall) -> String {
    if executed.result.is_success() {
        return success_line(&executed.call);
    }
    match executed.result.error() {
        Some(error) => format!("❌ {error}"),
        None => format!("❌ {} failed", executed.call.name),
    }
}

fn retried_ok(name: &str, later: &[ExecutedCall]) -> bool {
    later
        .iter()
        .any(|e| e.call.name == name && e.result.is_success())
}

/// Summary used when the model never produced text.
pub fn synthesize_summary(executed: &[ExecutedCall]) -> String {
    executed
        .iter()
        .map(confirmation_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append a `❌ tool: error` line for every failure whose error text does not
/// already appear in `text`. A failure is dropped once a later call to the
/// same tool succeeded.
pub fn append_unreported_failures(text: &str, executed: &[ExecutedCall]) -> String {
    let missing: Vec<String> = executed
        .iter()
        .enumerate()
        .filter(|(i, e)| !e.result.is_success() && !retried_ok(&e.call.name, &executed[i + 1..]))
        .filter_map(|(_, e)| {
            let error = e.result.error()?;
            (!text.contains(error)).then(|| format!("❌ {}: {error}", e.call.name))
        })
        .collect();

    if missing.is_empty() {
        return text.to_string();
    }
    format!("{}\n\n{}", text.trim_end(), missing.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(name: &str, args: Value) -> ExecutedCall {
        ExecutedCall {
            call: FunctionCall::new(name, args),
            result: FunctionCallResult::success(name, json!({})),
        }
    }

    fn failed(name: &str, error: &str) -> ExecutedCall {
        ExecutedCall {
            call: FunctionCall::new(name, json!({})),
            result: FunctionCallResult::failure(name, error),
        }
    }

    #[test]
    fn test_templates() {
        assert_eq!(confirmation_line(&ok("pause_task", json!({}))), "⏸️ Task paused");
        assert_eq!(
            confirmation_line(&ok("update_preferences", json!({"key": "language"}))),
            "✅ Preference updated: language"
        );
        assert_eq!(confirmation_line(&ok("water_plants", json!({}))), "✅ Done: water_plants");
    }

    #[test]
    fn test_failure_line_is_verbatim() {
        let line = confirmation_line(&failed("cancel_task", "Task not found: x"));
        assert_eq!(line, "❌ Task not found: x");
    }

    #[test]
    fn test_summary_one_line_per_call() {
        let summary = synthesize_summary(&[
            ok("schedule_task", json!({})),
            failed("pause_task", "Task is already paused"),
        ]);
        assert_eq!(summary, "✅ Task scheduled\n❌ Task is already paused");
    }

    #[test]
    fn test_append_unreported_failures() {
        let executed = [failed("cancel_task", "Task not found: x"), ok("list_tasks", json!({}))];

        let text = append_unreported_failures("Done!", &executed);
        assert_eq!(text, "Done!\n\n❌ cancel_task: Task not found: x");

        let reported = "Sorry, Task not found: x";
        assert_eq!(append_unreported_failures(reported, &executed), reported);
    }

    #[test]
    fn test_failure_retried_successfully_is_not_appended() {
        let executed = [
            failed("cancel_task", "Task not found: daily"),
            ok("list_tasks", json!({})),
            ok("cancel_task", json!({"id": "t1"})),
        ];
        assert_eq!(append_unreported_failures("Cancelled.", &executed), "Cancelled.");

        let failed_again = [ok("cancel_task", json!({})), failed("cancel_task", "Task not found: y")];
        assert_eq!(
            append_unreported_failures("Cancelled.", &failed_again),
            "Cancelled.\n\n❌ cancel_task: Task not found: y"
        );
    }
}
