//! Function-call orchestrator for one fast-path turn.
//!
//! `FunctionCallOrchestrator` runs the round loop:
//! stream a response, plan the emitted calls (mixed-batch filter, then
//! prioritized truncation), execute them sequentially, replay the call turn
//! and the responses, and stream again. The last permitted round carries no
//! tools so the model has to answer in text.
//!
//! Stream consumption and tool execution never overlap within a turn.

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, field, info_span, warn};

use fastpath_observe::genai_attrs::{
    GEN_AI_RESPONSE_FUNCTION_CALLS, GEN_AI_USAGE_CACHED_TOKENS, GEN_AI_USAGE_INPUT_TOKENS,
    GEN_AI_USAGE_OUTPUT_TOKENS,
};
use fastpath_types::config::EngineConfig;
use fastpath_types::llm::{
    Content, FunctionCall, LlmError, Part, RawPart, Role, StreamRequest, SystemInstruction,
    ToolSet, UsageMetadata,
};
use fastpath_types::tool::{FunctionCallResult, ToolDeclaration};

use crate::agent::confirm::ExecutedCall;
use crate::agent::progress::ProgressEmitter;
use crate::llm::client::ModelClient;
use crate::tool::batch::{BatchPlan, plan_batch, raw_covers};
use crate::tool::registry::{ToolInvocation, ToolRegistry};

/// Reason given to the model for a call dropped from a mixed batch.
pub const SKIPPED_CALL_REASON: &str = "Not executed: this action was requested in the same \
     step as read-only lookups. Review those results first, then call it again if it is \
     still needed.";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that terminate a turn.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("turn cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Input / output
// ---------------------------------------------------------------------------

/// Everything the loop needs besides the collaborators.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub instruction: SystemInstruction,
    /// Sanitized history followed by the current user message.
    pub contents: Vec<Content>,
    /// Function declarations. Empty disables function calling.
    pub declarations: Vec<ToolDeclaration>,
    pub web_search: bool,
}

/// Token usage summed over every model call of the turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenTotals {
    pub prompt_tokens: u32,
    pub response_tokens: u32,
    pub cached_tokens: u32,
    /// Whether any call reported usage at all.
    pub reported: bool,
}

impl TokenTotals {
    pub fn add(&mut self, usage: &UsageMetadata) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(usage.prompt_tokens);
        self.response_tokens = self.response_tokens.saturating_add(usage.response_tokens);
        self.cached_tokens = self
            .cached_tokens
            .saturating_add(usage.cached_tokens.unwrap_or(0));
        self.reported = true;
    }
}

/// Result of the round loop, before final text assembly.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Text of the latest round that produced any. A preamble streamed
    /// alongside function calls is replaced by the answer that follows them.
    pub text: String,
    /// Calls that actually ran, in execution order.
    pub executed: Vec<ExecutedCall>,
    /// Mutating calls dropped from mixed batches. Never executed.
    pub skipped: Vec<FunctionCall>,
    /// Calls cut by the per-round cap. Never executed.
    pub truncated: Vec<FunctionCall>,
    /// Rounds in which tools were executed.
    pub tool_rounds: usize,
    /// Model calls made.
    pub model_calls: usize,
    pub usage: TokenTotals,
}

/// What one drained stream produced.
#[derive(Debug, Default)]
struct RoundOutput {
    text: String,
    calls: Vec<FunctionCall>,
    raw_parts: Vec<RawPart>,
    usage: Option<UsageMetadata>,
}

// ---------------------------------------------------------------------------
// FunctionCallOrchestrator
// ---------------------------------------------------------------------------

/// Drives the stream/tool loop for a single turn. Borrowed collaborators
/// only; one instance per turn.
pub struct FunctionCallOrchestrator<'a, C> {
    client: &'a dyn ModelClient,
    tools: &'a ToolRegistry<C>,
    config: &'a EngineConfig,
}

impl<'a, C: Send + Sync> FunctionCallOrchestrator<'a, C> {
    pub fn new(
        client: &'a dyn ModelClient,
        tools: &'a ToolRegistry<C>,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            client,
            tools,
            config,
        }
    }

    /// Run rounds until the model answers in text, stops calling tools, or
    /// the round budget runs out.
    pub async fn run(
        &self,
        input: TurnInput,
        scope: ToolInvocation<'_, C>,
        emitter: &mut ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let TurnInput {
            instruction,
            mut contents,
            declarations,
            web_search,
        } = input;

        let max_calls = self.config.max_calls_per_turn.max(1);
        let mut outcome = TurnOutcome::default();

        loop {
            let offer_tools =
                !declarations.is_empty() && outcome.tool_rounds < self.config.max_tool_rounds;
            let request = StreamRequest {
                model: self.config.model.clone(),
                instruction: instruction.clone(),
                contents: contents.clone(),
                tools: tool_sets(&declarations, offer_tools, web_search),
            };

            let span = info_span!(
                "gen_ai.stream",
                gen_ai.system = self.client.name(),
                gen_ai.request.model = %self.config.model,
                gen_ai.request.stream = true,
                fastpath.round = outcome.model_calls + 1,
                fastpath.tools_offered = offer_tools,
                gen_ai.usage.input_tokens = field::Empty,
                gen_ai.usage.output_tokens = field::Empty,
                gen_ai.usage.cached_tokens = field::Empty,
                gen_ai.response.function_calls = field::Empty,
            );
            outcome.model_calls += 1;

            let round = self
                .drain_round(request, emitter, cancel)
                .instrument(span.clone())
                .await?;

            if let Some(usage) = &round.usage {
                span.record(GEN_AI_USAGE_INPUT_TOKENS, usage.prompt_tokens);
                span.record(GEN_AI_USAGE_OUTPUT_TOKENS, usage.response_tokens);
                if let Some(cached) = usage.cached_tokens {
                    span.record(GEN_AI_USAGE_CACHED_TOKENS, cached);
                }
                outcome.usage.add(usage);
            }
            span.record(GEN_AI_RESPONSE_FUNCTION_CALLS, round.calls.len());
            if !round.text.trim().is_empty() {
                outcome.text = round.text;
            }

            if round.calls.is_empty() {
                break;
            }
            if !offer_tools {
                warn!(
                    calls = ?call_names(&round.calls),
                    "Model returned function calls without tools offered, ignoring"
                );
                break;
            }

            let plan = plan_batch(
                &round.calls,
                &round.raw_parts,
                self.tools.classifier(),
                max_calls,
                self.config.notify_skipped_calls,
            );
            log_plan(&plan);

            let results = self.execute_plan(&plan, scope, cancel).await?;

            let responses = response_parts(&plan, &results);
            contents.push(call_turn(&plan));
            contents.push(Content {
                role: Role::User,
                parts: responses,
            });

            outcome.executed.extend(
                plan.execute
                    .iter()
                    .cloned()
                    .zip(results)
                    .map(|(call, result)| ExecutedCall { call, result }),
            );
            outcome.skipped.extend(plan.dropped);
            outcome.truncated.extend(plan.truncated);
            outcome.tool_rounds += 1;
        }

        debug!(
            model_calls = outcome.model_calls,
            tool_rounds = outcome.tool_rounds,
            executed = outcome.executed.len(),
            skipped = outcome.skipped.len(),
            "Round loop finished"
        );
        Ok(outcome)
    }

    /// Drain one stream completely. Cancellation is checked between chunks.
    async fn drain_round(
        &self,
        request: StreamRequest,
        emitter: &mut ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<RoundOutput, TurnError> {
        let mut stream = self.client.stream(request);
        let mut out = RoundOutput::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TurnError::Cancelled),
                item = stream.next() => item,
            };
            let Some(item) = next else { break };
            let chunk = item?;

            if let Some(delta) = chunk.text_delta.as_deref().filter(|d| !d.is_empty()) {
                emitter.push_text(delta);
                out.text.push_str(delta);
            }
            for call in &chunk.function_calls {
                emitter.tool_use(&call.name);
            }
            out.calls.extend(chunk.function_calls);
            out.raw_parts.extend(chunk.raw_parts);
            if chunk.usage.is_some() {
                out.usage = chunk.usage;
            }
        }

        Ok(out)
    }

    /// Execute the planned calls one after another, in order.
    async fn execute_plan(
        &self,
        plan: &BatchPlan,
        scope: ToolInvocation<'_, C>,
        cancel: &CancellationToken,
    ) -> Result<Vec<FunctionCallResult>, TurnError> {
        let mut results = Vec::with_capacity(plan.execute.len());
        for call in &plan.execute {
            if cancel.is_cancelled() {
                return Err(TurnError::Cancelled);
            }
            let span = info_span!("gen_ai.tool", gen_ai.tool.name = %call.name);
            let result = self
                .tools
                .execute(
                    &call.name,
                    call.args.clone(),
                    scope.ctx,
                    scope.group_id,
                    scope.chat_id,
                    scope.is_main,
                )
                .instrument(span)
                .await;
            if !result.is_success() {
                warn!(tool = %call.name, error = ?result.error(), "Tool call failed");
            }
            results.push(result);
        }
        Ok(results)
    }
}

fn tool_sets(declarations: &[ToolDeclaration], offer_tools: bool, web_search: bool) -> Vec<ToolSet> {
    let mut tools = Vec::new();
    if offer_tools {
        tools.push(ToolSet::Functions(declarations.to_vec()));
    }
    // The forced text-only round carries no tools at all.
    if web_search && (offer_tools || declarations.is_empty()) {
        tools.push(ToolSet::WebSearch);
    }
    tools
}

fn call_names(calls: &[FunctionCall]) -> Vec<&str> {
    calls.iter().map(|c| c.name.as_str()).collect()
}

fn log_plan(plan: &BatchPlan) {
    if !plan.dropped.is_empty() {
        warn!(
            dropped = ?call_names(&plan.dropped),
            kept = ?call_names(&plan.execute),
            "Dropped mutating calls from a mixed batch"
        );
    }
    if !plan.truncated.is_empty() {
        warn!(
            truncated = ?call_names(&plan.truncated),
            "Batch exceeded the per-round call limit"
        );
    }
}

/// Model turn echoing the calls being answered. Raw provider parts are
/// replayed unmodified when they cover every replayed call.
fn call_turn(plan: &BatchPlan) -> Content {
    let parts = if raw_covers(&plan.raw_parts, &plan.replay) {
        plan.raw_parts.iter().cloned().map(Part::Raw).collect()
    } else {
        plan.replay
            .iter()
            .cloned()
            .map(Part::FunctionCall)
            .collect()
    };
    Content {
        role: Role::Model,
        parts,
    }
}

/// One function response per replayed call: executed results first, then a
/// skipped notice for every dropped call that is replayed.
fn response_parts(plan: &BatchPlan, results: &[FunctionCallResult]) -> Vec<Part> {
    let skipped = plan.replay[plan.execute.len()..]
        .iter()
        .map(|call| FunctionCallResult::skipped(&call.name, SKIPPED_CALL_REASON));

    results
        .iter()
        .cloned()
        .chain(skipped)
        .map(|r| Part::FunctionResponse {
            name: r.name,
            response: r.response,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures_util::future::BoxFuture;
    use serde_json::{Value, json};

    use fastpath_types::llm::StreamChunk;
    use fastpath_types::tool::ToolAccess;

    use super::*;
    use crate::llm::client::ChunkStream;
    use crate::tool::registry::{ToolError, ToolHandler};

    // -- scripted client --------------------------------------------------

    struct Scripted {
        rounds: Mutex<VecDeque<Vec<Result<StreamChunk, LlmError>>>>,
        requests: Mutex<Vec<StreamRequest>>,
    }

    impl Scripted {
        fn new(rounds: Vec<Vec<Result<StreamChunk, LlmError>>>) -> Self {
            Self {
                rounds: Mutex::new(rounds.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<StreamRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl ModelClient for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn stream(&self, request: StreamRequest) -> ChunkStream {
            self.requests.lock().unwrap().push(request);
            let chunks = self.rounds.lock().unwrap().pop_front().unwrap_or_default();
            Box::pin(futures_util::stream::iter(chunks))
        }
    }

    fn text(t: &str) -> Result<StreamChunk, LlmError> {
        Ok(StreamChunk::text(t))
    }

    fn calls(names: &[&str]) -> Result<StreamChunk, LlmError> {
        Ok(StreamChunk {
            function_calls: names.iter().map(|n| FunctionCall::new(*n, json!({}))).collect(),
            raw_parts: names
                .iter()
                .map(|n| RawPart::new(Some(n.to_string()), format!(r#"{{"sig":"{n}"}}"#)))
                .collect(),
            ..Default::default()
        })
    }

    // -- recording tools --------------------------------------------------

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        access: ToolAccess,
        fail_with: Option<&'static str>,
    }

    impl ToolHandler<Log> for Recording {
        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration {
                name: self.name.to_string(),
                description: String::new(),
                parameters: json!({"type": "object"}),
            }
        }

        fn access(&self) -> ToolAccess {
            self.access
        }

        fn call<'a>(
            &'a self,
            _args: Value,
            invocation: ToolInvocation<'a, Log>,
        ) -> BoxFuture<'a, Result<Value, ToolError>> {
            Box::pin(async move {
                invocation.ctx.lock().unwrap().push(self.name.to_string());
                match self.fail_with {
                    Some(e) => Err(ToolError::Failed(e.to_string())),
                    None => Ok(json!({"ok": true})),
                }
            })
        }
    }

    fn registry() -> ToolRegistry<Log> {
        let mut registry = ToolRegistry::new();
        for (name, access) in [
            ("list_tasks", ToolAccess::ReadOnly),
            ("get_task", ToolAccess::ReadOnly),
            ("cancel_task", ToolAccess::Mutating),
            ("pause_task", ToolAccess::Mutating),
        ] {
            registry.register(Arc::new(Recording {
                name,
                access,
                fail_with: None,
            }));
        }
        registry
    }

    fn input(tools: &ToolRegistry<Log>) -> TurnInput {
        TurnInput {
            instruction: SystemInstruction::Inline("sys".to_string()),
            contents: vec![Content::user_text("hi")],
            declarations: tools.declarations(true),
            web_search: false,
        }
    }

    async fn run(
        client: &Scripted,
        tools: &ToolRegistry<Log>,
        config: &EngineConfig,
        log: &Log,
    ) -> Result<TurnOutcome, TurnError> {
        let orchestrator = FunctionCallOrchestrator::new(client, tools, config);
        let mut emitter = ProgressEmitter::new(None, Duration::ZERO);
        let scope = ToolInvocation {
            ctx: log,
            group_id: "g",
            chat_id: "c",
            is_main: true,
        };
        orchestrator
            .run(input(tools), scope, &mut emitter, &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_text_only_single_round() {
        let client = Scripted::new(vec![vec![text("Hello"), text(" there")]]);
        let tools = registry();
        let log = Log::default();
        let outcome = run(&client, &tools, &EngineConfig::default(), &log).await.unwrap();
        assert_eq!(outcome.text, "Hello there");
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(outcome.tool_rounds, 0);
    }

    #[tokio::test]
    async fn test_mixed_batch_executes_only_read_only() {
        let client = Scripted::new(vec![
            vec![calls(&["list_tasks", "cancel_task"])],
            vec![text("You have 3 tasks.")],
        ]);
        let tools = registry();
        let log = Log::default();
        let outcome = run(&client, &tools, &EngineConfig::default(), &log).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["list_tasks"]);
        assert_eq!(call_names(&outcome.skipped), vec!["cancel_task"]);

        // Second request replays both calls and answers the dropped one as skipped.
        let second = &client.requests()[1];
        let replayed = &second.contents[1];
        assert_eq!(replayed.role, Role::Model);
        assert!(replayed.parts.iter().all(|p| matches!(p, Part::Raw(_))));
        assert_eq!(replayed.parts.len(), 2);
        let responses = &second.contents[2].parts;
        match &responses[1] {
            Part::FunctionResponse { name, response } => {
                assert_eq!(name, "cancel_task");
                assert_eq!(response["skipped"], true);
            }
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_silent_drop_when_notification_disabled() {
        let client = Scripted::new(vec![
            vec![calls(&["list_tasks", "cancel_task"])],
            vec![text("ok")],
        ]);
        let tools = registry();
        let log = Log::default();
        let config = EngineConfig {
            notify_skipped_calls: false,
            ..EngineConfig::default()
        };
        run(&client, &tools, &config, &log).await.unwrap();

        let second = &client.requests()[1];
        assert_eq!(second.contents[1].parts.len(), 1);
        assert_eq!(second.contents[2].parts.len(), 1);
    }

    #[tokio::test]
    async fn test_round_budget_and_final_round_without_tools() {
        let client = Scripted::new(vec![
            vec![calls(&["list_tasks"])],
            vec![calls(&["get_task"])],
            vec![calls(&["list_tasks"])],
            vec![calls(&["get_task"])],
            vec![calls(&["list_tasks"])],
        ]);
        let tools = registry();
        let log = Log::default();
        let config = EngineConfig {
            max_tool_rounds: 3,
            ..EngineConfig::default()
        };
        let outcome = run(&client, &tools, &config, &log).await.unwrap();

        assert_eq!(outcome.tool_rounds, 3);
        assert_eq!(log.lock().unwrap().len(), 3);
        let requests = client.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests[..3].iter().all(StreamRequest::has_function_tools));
        assert!(requests[3].tools.is_empty());
    }

    #[tokio::test]
    async fn test_truncation_caps_executed_calls() {
        let client = Scripted::new(vec![
            vec![calls(&["get_task", "get_task", "get_task", "list_tasks"])],
            vec![text("done")],
        ]);
        let tools = registry();
        let log = Log::default();
        let config = EngineConfig {
            max_calls_per_turn: 2,
            ..EngineConfig::default()
        };
        let outcome = run(&client, &tools, &config, &log).await.unwrap();

        assert_eq!(outcome.executed.len(), 2);
        assert_eq!(outcome.truncated.len(), 2);
        let second = &client.requests()[1];
        assert_eq!(second.contents[1].parts.len(), 2);
        assert_eq!(second.contents[2].parts.len(), 2);
    }

    #[tokio::test]
    async fn test_usage_is_summed_across_rounds() {
        let usage = |p, r| {
            Ok(StreamChunk::usage(UsageMetadata {
                prompt_tokens: p,
                response_tokens: r,
                cached_tokens: None,
            }))
        };
        let client = Scripted::new(vec![
            vec![calls(&["list_tasks"]), usage(5, 1), usage(10, 2)],
            vec![text("ok"), usage(20, 3)],
        ]);
        let tools = registry();
        let log = Log::default();
        let outcome = run(&client, &tools, &EngineConfig::default(), &log).await.unwrap();
        assert_eq!(outcome.usage.prompt_tokens, 30);
        assert_eq!(outcome.usage.response_tokens, 5);
        assert!(outcome.usage.reported);
    }

    #[tokio::test]
    async fn test_stream_error_terminates() {
        let client = Scripted::new(vec![vec![
            text("partial"),
            Err(LlmError::Stream("connection reset".to_string())),
        ]]);
        let tools = registry();
        let log = Log::default();
        let err = run(&client, &tools, &EngineConfig::default(), &log)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Llm(LlmError::Stream(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_streaming() {
        let client = Scripted::new(vec![vec![text("never")]]);
        let tools = registry();
        let config = EngineConfig::default();
        let orchestrator = FunctionCallOrchestrator::new(&client, &tools, &config);
        let mut emitter = ProgressEmitter::new(None, Duration::ZERO);
        let log = Log::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let scope = ToolInvocation {
            ctx: &log,
            group_id: "g",
            chat_id: "c",
            is_main: true,
        };
        let err = orchestrator
            .run(input(&tools), scope, &mut emitter, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Cancelled));
    }

    #[test]
    fn test_web_search_tool_sets() {
        let decls = vec![ToolDeclaration {
            name: "list_tasks".to_string(),
            description: String::new(),
            parameters: json!({}),
        }];
        assert_eq!(tool_sets(&decls, true, true).len(), 2);
        assert!(tool_sets(&decls, false, true).is_empty());
        assert_eq!(tool_sets(&[], false, true), vec![ToolSet::WebSearch]);
        assert!(tool_sets(&[], false, false).is_empty());
    }
}
