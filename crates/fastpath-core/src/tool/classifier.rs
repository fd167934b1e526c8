//! Tool safety classification.
//!
//! Every tool name is either read-only (safe to run before the model has
//! seen any results) or mutating. The two sets are disjoint; names that
//! appear in neither set, or were registered as both, classify as mutating.

use std::collections::HashSet;

use fastpath_types::tool::ToolAccess;

// ---------------------------------------------------------------------------
// Built-in tables
// ---------------------------------------------------------------------------

/// Built-in tools that only read state.
pub const READ_ONLY_TOOLS: &[&str] = &[
    "list_tasks",
    "get_task",
    "list_groups",
    "get_preferences",
    "search_knowledge",
    "list_knowledge_docs",
    "get_current_time",
    "list_calendar_events",
    "list_google_tasks",
    "search_drive",
];

/// Built-in tools that change state or have external side effects.
pub const MUTATING_TOOLS: &[&str] = &[
    "schedule_task",
    "cancel_task",
    "pause_task",
    "resume_task",
    "update_task",
    "update_preferences",
    "send_message",
    "register_group",
    "add_knowledge_doc",
    "delete_knowledge_doc",
    "create_calendar_event",
    "create_google_task",
    "complete_google_task",
];

// ---------------------------------------------------------------------------
// ToolClassifier
// ---------------------------------------------------------------------------

/// Name-keyed lookup of [`ToolAccess`].
#[derive(Debug, Clone)]
pub struct ToolClassifier {
    read_only: HashSet<String>,
    mutating: HashSet<String>,
}

impl ToolClassifier {
    /// A classifier that knows no tools. Everything is mutating.
    pub fn empty() -> Self {
        Self {
            read_only: HashSet::new(),
            mutating: HashSet::new(),
        }
    }

    /// Record the access class of a tool.
    ///
    /// Re-registering a name moves it between sets, so the sets stay disjoint.
    pub fn register(&mut self, name: impl Into<String>, access: ToolAccess) {
        let name = name.into();
        match access {
            ToolAccess::ReadOnly => {
                if !self.mutating.contains(&name) {
                    self.read_only.insert(name);
                }
            }
            ToolAccess::Mutating => {
                self.read_only.remove(&name);
                self.mutating.insert(name);
            }
        }
    }

    pub fn access(&self, name: &str) -> ToolAccess {
        if self.read_only.contains(name) && !self.mutating.contains(name) {
            ToolAccess::ReadOnly
        } else {
            ToolAccess::Mutating
        }
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        self.access(name).is_read_only()
    }
}

impl Default for ToolClassifier {
    fn default() -> Self {
        let mut classifier = Self::empty();
        for name in READ_ONLY_TOOLS {
            classifier.register(*name, ToolAccess::ReadOnly);
        }
        for name in MUTATING_TOOLS {
            classifier.register(*name, ToolAccess::Mutating);
        }
        classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_are_disjoint() {
        for name in READ_ONLY_TOOLS {
            assert!(!MUTATING_TOOLS.contains(name), "{name} is in both tables");
        }
    }

    #[test]
    fn test_default_classification() {
        let classifier = ToolClassifier::default();
        assert!(classifier.is_read_only("list_tasks"));
        assert!(classifier.is_read_only("get_current_time"));
        assert_eq!(classifier.access("cancel_task"), ToolAccess::Mutating);
        assert_eq!(classifier.access("schedule_task"), ToolAccess::Mutating);
    }

    #[test]
    fn test_unknown_tool_is_mutating() {
        let classifier = ToolClassifier::default();
        assert_eq!(classifier.access("launch_rockets"), ToolAccess::Mutating);
        assert_eq!(ToolClassifier::empty().access("list_tasks"), ToolAccess::Mutating);
    }

    #[test]
    fn test_mutating_registration_wins() {
        let mut classifier = ToolClassifier::empty();
        classifier.register("sync_notes", ToolAccess::ReadOnly);
        assert!(classifier.is_read_only("sync_notes"));

        classifier.register("sync_notes", ToolAccess::Mutating);
        assert!(!classifier.is_read_only("sync_notes"));

        classifier.register("sync_notes", ToolAccess::ReadOnly);
        assert!(!classifier.is_read_only("sync_notes"));
    }
}
