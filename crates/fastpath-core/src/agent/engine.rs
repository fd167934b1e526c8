//! Fast-path turn engine.
//!
//! `FastPathEngine` is the public entry point: it assembles the prompt,
//! resolves the cached prefix, runs the `FunctionCallOrchestrator`, and
//! finalizes the answer. `run_turn` wraps all of it in the timeout guard, so
//! it always returns a well-formed `AgentTurnResult` and never panics.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use fastpath_types::config::EngineConfig;
use fastpath_types::group::GroupSettings;
use fastpath_types::llm::{Content, SystemInstruction};
use fastpath_types::turn::{AgentTurnRequest, AgentTurnResult};

use crate::agent::confirm::{append_unreported_failures, synthesize_summary};
use crate::agent::eligibility::{Eligibility, check_eligibility};
use crate::agent::history::sanitize_history;
use crate::agent::knowledge::{BoxKnowledgeSource, NoKnowledge, fetch_knowledge};
use crate::agent::orchestrator::{FunctionCallOrchestrator, TurnError, TurnInput, TurnOutcome};
use crate::agent::progress::{ProgressEmitter, ProgressSender};
use crate::agent::prompt::{SystemPromptBuilder, build_user_message, split_follow_ups};
use crate::llm::cache::{BoxContextCache, NoCache};
use crate::llm::client::ModelClient;
use crate::tool::registry::{ToolInvocation, ToolRegistry, panic_message};

/// Executes single conversational turns against a model backend.
///
/// Shareable behind `Arc`; turns are independent of each other.
pub struct FastPathEngine<C> {
    config: EngineConfig,
    client: Arc<dyn ModelClient>,
    cache: BoxContextCache,
    knowledge: BoxKnowledgeSource,
    tools: ToolRegistry<C>,
}

impl<C: Send + Sync> FastPathEngine<C> {
    /// Engine without a context cache or knowledge source.
    pub fn new(config: EngineConfig, client: Arc<dyn ModelClient>, tools: ToolRegistry<C>) -> Self {
        Self {
            config,
            client,
            cache: BoxContextCache::new(NoCache),
            knowledge: BoxKnowledgeSource::new(NoKnowledge),
            tools,
        }
    }

    pub fn with_cache(mut self, cache: BoxContextCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_knowledge(mut self, knowledge: BoxKnowledgeSource) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry<C> {
        &self.tools
    }

    pub fn check_eligibility(&self, group: &GroupSettings, has_media: bool) -> Eligibility {
        check_eligibility(&self.config, group, has_media, self.client.as_ref())
    }

    /// Whether a request for `group` may take the fast path.
    pub fn is_eligible(&self, group: &GroupSettings, has_media: bool) -> bool {
        self.check_eligibility(group, has_media).is_eligible()
    }

    /// Run one turn. Returns only after completion, timeout or failure.
    pub async fn run_turn(
        &self,
        group: &GroupSettings,
        request: AgentTurnRequest,
        ctx: &C,
        progress: Option<ProgressSender>,
    ) -> AgentTurnResult {
        self.run_turn_cancellable(group, request, ctx, progress, CancellationToken::new())
            .await
    }

    /// Like [`run_turn`](Self::run_turn), with a caller-held token that
    /// aborts the turn early. The token is also cancelled on timeout.
    pub async fn run_turn_cancellable(
        &self,
        group: &GroupSettings,
        request: AgentTurnRequest,
        ctx: &C,
        progress: Option<ProgressSender>,
        cancel: CancellationToken,
    ) -> AgentTurnResult {
        let turn_id = Uuid::now_v7();
        let span = info_span!(
            "fastpath.turn",
            turn_id = %turn_id,
            group = %request.group_id,
            model = %self.config.model,
        );

        async move {
            let eligibility = self.check_eligibility(group, request.has_media);
            if !eligibility.is_eligible() {
                debug!(?eligibility, "Request is not eligible for the fast path");
                return AgentTurnResult::error(format!(
                    "fast path not eligible: {eligibility:?}"
                ));
            }

            let started = Instant::now();
            let deadline = self.config.turn_timeout();
            let turn = AssertUnwindSafe(self.execute_turn(request, ctx, progress, &cancel))
                .catch_unwind();

            let result = match tokio::time::timeout(deadline, turn).await {
                Ok(Ok(Ok(result))) => result,
                Ok(Ok(Err(e))) => {
                    warn!(error = %e, "Turn failed");
                    AgentTurnResult::error(format!("fast path failed: {e}"))
                }
                Ok(Err(panic)) => {
                    let message = panic_message(panic.as_ref());
                    error!(panic = %message, "Turn panicked");
                    AgentTurnResult::error(format!("fast path panicked: {message}"))
                }
                Err(_elapsed) => {
                    cancel.cancel();
                    warn!(timeout_ms = deadline.as_millis() as u64, "Turn timed out");
                    AgentTurnResult::error(format!(
                        "fast path timed out after {}",
                        format_duration(deadline)
                    ))
                }
            };

            info!(
                success = result.is_success(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                prompt_tokens = ?result.prompt_tokens,
                response_tokens = ?result.response_tokens,
                "Turn finished"
            );
            result
        }
        .instrument(span)
        .await
    }

    async fn execute_turn(
        &self,
        request: AgentTurnRequest,
        ctx: &C,
        progress: Option<ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<AgentTurnResult, TurnError> {
        let declarations = if request.function_calling_disabled {
            Vec::new()
        } else {
            self.tools.declarations(request.is_main)
        };

        let base = request
            .system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.config.default_system_prompt);
        let memory = request.memory_context.as_deref();
        let instruction_text = SystemPromptBuilder::build(
            base,
            memory,
            self.config.follow_up_suggestions,
            !declarations.is_empty(),
        );

        // Providers reject a cached prefix combined with tools, so a cache
        // created for a tool-bearing turn would never be referenced.
        let offers_tools = !declarations.is_empty() || request.web_search_enabled;
        let handle = if offers_tools {
            None
        } else {
            self.cache
                .get_or_create(&request.group_id, &self.config.model, &instruction_text, memory)
                .await
        };
        let instruction = match handle {
            Some(handle) => {
                debug!(cache = %handle, "Using cached system instruction");
                SystemInstruction::Cached {
                    handle,
                    inline: instruction_text,
                }
            }
            None => {
                debug!(offers_tools, "No context cache, sending system instruction inline");
                SystemInstruction::Inline(instruction_text)
            }
        };

        let knowledge = fetch_knowledge(
            &self.knowledge,
            &request.prompt,
            &request.group_id,
            self.config.knowledge_max_chars,
        )
        .await;

        let mut contents =
            sanitize_history(&request.conversation_history, self.config.max_history_turns);
        contents.push(Content::user_text(build_user_message(
            &request.prompt,
            knowledge.as_deref(),
        )));

        let mut emitter = ProgressEmitter::new(progress, self.config.progress_interval());
        let orchestrator =
            FunctionCallOrchestrator::new(self.client.as_ref(), &self.tools, &self.config);
        let scope = ToolInvocation {
            ctx,
            group_id: &request.group_id,
            chat_id: &request.chat_id,
            is_main: request.is_main,
        };
        let input = TurnInput {
            instruction,
            contents,
            declarations,
            web_search: request.web_search_enabled,
        };

        let outcome = orchestrator.run(input, scope, &mut emitter, cancel).await?;
        debug!(
            cached_tokens = outcome.usage.cached_tokens,
            truncated = outcome.truncated.len(),
            "Orchestration complete"
        );

        let (text, follow_ups) = self.finalize_text(&outcome);
        emitter.finish(&text);

        let mut result = AgentTurnResult::success((!text.is_empty()).then_some(text));
        result.follow_ups = follow_ups;
        if outcome.usage.reported {
            result.prompt_tokens = Some(outcome.usage.prompt_tokens);
            result.response_tokens = Some(outcome.usage.response_tokens);
        }
        Ok(result)
    }

    /// Final answer text plus any follow-up suggestions split out of it.
    fn finalize_text(&self, outcome: &TurnOutcome) -> (String, Vec<String>) {
        let (body, follow_ups) = if self.config.follow_up_suggestions {
            split_follow_ups(&outcome.text)
        } else {
            (outcome.text.clone(), Vec::new())
        };

        let body = body.trim();
        let text = if body.is_empty() {
            synthesize_summary(&outcome.executed)
        } else {
            append_unreported_failures(body, &outcome.executed)
        };
        (text, follow_ups)
    }
}

impl<C> std::fmt::Debug for FastPathEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastPathEngine")
            .field("client", &self.client.name())
            .field("model", &self.config.model)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

/// "5s" for whole seconds, "250ms" otherwise.
fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(180)), "180s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
    }

    fn outcome_with_text(text: &str) -> TurnOutcome {
        TurnOutcome {
            text: text.to_string(),
            ..Default::default()
        }
    }

    fn engine(follow_ups: bool) -> FastPathEngine<()> {
        struct Down;
        impl ModelClient for Down {
            fn name(&self) -> &str {
                "down"
            }
            fn is_available(&self) -> bool {
                false
            }
            fn stream(
                &self,
                _request: fastpath_types::llm::StreamRequest,
            ) -> crate::llm::client::ChunkStream {
                Box::pin(futures_util::stream::empty())
            }
        }
        let config = EngineConfig {
            follow_up_suggestions: follow_ups,
            ..EngineConfig::default()
        };
        FastPathEngine::new(config, Arc::new(Down), ToolRegistry::new())
    }

    #[test]
    fn test_finalize_splits_follow_ups_only_when_enabled() {
        let outcome = outcome_with_text("Sure.\n>>> Anything else?");

        let (text, follow_ups) = engine(true).finalize_text(&outcome);
        assert_eq!(text, "Sure.");
        assert_eq!(follow_ups, vec!["Anything else?"]);

        let (text, follow_ups) = engine(false).finalize_text(&outcome);
        assert_eq!(text, "Sure.\n>>> Anything else?");
        assert!(follow_ups.is_empty());
    }

    #[tokio::test]
    async fn test_ineligible_turn_returns_error_shape() {
        let engine = engine(false);
        let result = engine
            .run_turn(
                &GroupSettings::new("g"),
                AgentTurnRequest::new("hi", "g", "c"),
                &(),
                None,
            )
            .await;
        assert!(!result.is_success());
        assert!(result.result.is_none());
        assert!(result.error.unwrap().contains("not eligible"));
    }
}
