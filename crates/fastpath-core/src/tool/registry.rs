//! Closed registry of typed tool handlers.
//!
//! Tools are resolved by name through a `HashMap` of handlers behind one
//! trait. Each handler declares its own [`ToolAccess`], which feeds the
//! registry's [`ToolClassifier`]. `execute` never fails: unknown names,
//! permission denials, handler errors and handler panics all become
//! `success: false` results.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use fastpath_types::tool::{FunctionCallResult, ToolAccess, ToolDeclaration};

use crate::tool::classifier::ToolClassifier;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a tool handler.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The message is shown to the user verbatim.
    #[error("{0}")]
    Failed(String),

    #[error("{tool} is only available in the main group")]
    NotPermitted { tool: String },
}

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

/// Where a tool call originates. Borrowed for the duration of one call.
#[derive(Debug)]
pub struct ToolInvocation<'a, C> {
    /// Caller-supplied execution context (database handles, scheduler, ...).
    pub ctx: &'a C,
    pub group_id: &'a str,
    pub chat_id: &'a str,
    pub is_main: bool,
}

// Manual impls: `C` itself need not be Clone/Copy.
impl<C> Clone for ToolInvocation<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for ToolInvocation<'_, C> {}

/// A single callable tool.
///
/// `C` is the execution context the host application passes to every turn.
pub trait ToolHandler<C>: Send + Sync {
    fn declaration(&self) -> ToolDeclaration;

    fn access(&self) -> ToolAccess;

    /// Restrict the tool to the main group. Defaults to `false`.
    fn main_only(&self) -> bool {
        false
    }

    fn call<'a>(
        &'a self,
        args: Value,
        invocation: ToolInvocation<'a, C>,
    ) -> BoxFuture<'a, Result<Value, ToolError>>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Name-keyed tool handlers plus the classifier derived from them.
pub struct ToolRegistry<C> {
    handlers: HashMap<String, Arc<dyn ToolHandler<C>>>,
    /// Registration order, so declarations are deterministic.
    order: Vec<String>,
    classifier: ToolClassifier,
}

impl<C: Send + Sync> ToolRegistry<C> {
    /// An empty registry whose classifier starts from the built-in tables.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            order: Vec::new(),
            classifier: ToolClassifier::default(),
        }
    }

    /// Register a handler under its declared name, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler<C>>) {
        let name = handler.declaration().name;
        self.classifier.register(name.clone(), handler.access());
        if self.handlers.insert(name.clone(), handler).is_none() {
            self.order.push(name);
        }
    }

    pub fn classifier(&self) -> &ToolClassifier {
        &self.classifier
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Declarations offered to the model. Main-only tools are omitted for
    /// other groups.
    pub fn declarations(&self, is_main: bool) -> Vec<ToolDeclaration> {
        self.order
            .iter()
            .filter_map(|name| self.handlers.get(name))
            .filter(|h| is_main || !h.main_only())
            .map(|h| h.declaration())
            .collect()
    }

    /// Execute one call. Never fails.
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        ctx: &C,
        group_id: &str,
        chat_id: &str,
        is_main: bool,
    ) -> FunctionCallResult {
        let Some(handler) = self.handlers.get(name) else {
            warn!(tool = name, "Model called an undeclared tool");
            return FunctionCallResult::failure(name, format!("Unknown function: {name}"));
        };

        if handler.main_only() && !is_main {
            let err = ToolError::NotPermitted {
                tool: name.to_string(),
            };
            return FunctionCallResult::failure(name, err.to_string());
        }

        let invocation = ToolInvocation {
            ctx,
            group_id,
            chat_id,
            is_main,
        };

        match AssertUnwindSafe(handler.call(args, invocation))
            .catch_unwind()
            .await
        {
            Ok(Ok(data)) => {
                debug!(tool = name, "Tool call succeeded");
                FunctionCallResult::success(name, data)
            }
            Ok(Err(e)) => {
                debug!(tool = name, error = %e, "Tool call failed");
                FunctionCallResult::failure(name, e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(tool = name, panic = %message, "Tool handler panicked");
                FunctionCallResult::failure(name, format!("{name} crashed: {message}"))
            }
        }
    }
}

impl<C: Send + Sync> Default for ToolRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for ToolRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish_non_exhaustive()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Ctx {
        tasks: Vec<&'static str>,
    }

    struct ListTasks;

    impl ToolHandler<Ctx> for ListTasks {
        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration {
                name: "list_tasks".to_string(),
                description: "List scheduled tasks".to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        fn access(&self) -> ToolAccess {
            ToolAccess::ReadOnly
        }

        fn call<'a>(
            &'a self,
            _args: Value,
            invocation: ToolInvocation<'a, Ctx>,
        ) -> BoxFuture<'a, Result<Value, ToolError>> {
            Box::pin(async move {
                Ok(json!({ "tasks": invocation.ctx.tasks, "group": invocation.group_id }))
            })
        }
    }

    struct RegisterGroup;

    impl ToolHandler<Ctx> for RegisterGroup {
        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration {
                name: "register_group".to_string(),
                description: "Register a group".to_string(),
                parameters: json!({"type": "object"}),
            }
        }

        fn access(&self) -> ToolAccess {
            ToolAccess::Mutating
        }

        fn main_only(&self) -> bool {
            true
        }

        fn call<'a>(
            &'a self,
            args: Value,
            _invocation: ToolInvocation<'a, Ctx>,
        ) -> BoxFuture<'a, Result<Value, ToolError>> {
            Box::pin(async move {
                match args.get("name").and_then(Value::as_str) {
                    Some(name) => Ok(json!({ "registered": name })),
                    None => Err(ToolError::InvalidArguments("missing name".to_string())),
                }
            })
        }
    }

    struct Exploding;

    impl ToolHandler<Ctx> for Exploding {
        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration {
                name: "explode".to_string(),
                description: "Always panics".to_string(),
                parameters: json!({"type": "object"}),
            }
        }

        fn access(&self) -> ToolAccess {
            ToolAccess::ReadOnly
        }

        fn call<'a>(
            &'a self,
            _args: Value,
            _invocation: ToolInvocation<'a, Ctx>,
        ) -> BoxFuture<'a, Result<Value, ToolError>> {
            Box::pin(async move { panic!("boom") })
        }
    }

    fn registry() -> ToolRegistry<Ctx> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ListTasks));
        registry.register(Arc::new(RegisterGroup));
        registry.register(Arc::new(Exploding));
        registry
    }

    fn ctx() -> Ctx {
        Ctx {
            tasks: vec!["water plants", "call mom"],
        }
    }

    #[test]
    fn test_declarations_respect_main_only() {
        let registry = registry();
        let main: Vec<_> = registry.declarations(true).into_iter().map(|d| d.name).collect();
        assert_eq!(main, vec!["list_tasks", "register_group", "explode"]);

        let other: Vec<_> = registry.declarations(false).into_iter().map(|d| d.name).collect();
        assert_eq!(other, vec!["list_tasks", "explode"]);
    }

    #[test]
    fn test_registration_feeds_classifier() {
        let registry = registry();
        assert!(registry.classifier().is_read_only("explode"));
        assert!(!registry.classifier().is_read_only("register_group"));
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_execute_success() {
        let result = registry()
            .execute("list_tasks", json!({}), &ctx(), "family", "chat-1", false)
            .await;
        assert!(result.is_success());
        assert_eq!(result.response["tasks"], json!(["water plants", "call mom"]));
        assert_eq!(result.response["group"], "family");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let result = registry()
            .execute("launch_rockets", json!({}), &ctx(), "g", "c", true)
            .await;
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("Unknown function: launch_rockets"));
    }

    #[tokio::test]
    async fn test_execute_main_only_denied() {
        let result = registry()
            .execute("register_group", json!({"name": "x"}), &ctx(), "g", "c", false)
            .await;
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("main group"));
    }

    #[tokio::test]
    async fn test_execute_handler_error() {
        let result = registry()
            .execute("register_group", json!({}), &ctx(), "g", "c", true)
            .await;
        assert_eq!(result.error(), Some("invalid arguments: missing name"));
    }

    #[tokio::test]
    async fn test_execute_catches_panic() {
        let result = registry()
            .execute("explode", json!({}), &ctx(), "g", "c", true)
            .await;
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("explode crashed: boom"));
    }
}
