//! Turn execution for the fastpath engine.
//!
//! The agent module drives one conversational turn:
//! - `eligibility`: decides whether a request may use the fast path at all
//! - `SystemPromptBuilder` / `history` / `knowledge`: assemble what the model sees
//! - `FunctionCallOrchestrator`: the multi-round stream/tool loop
//! - `ProgressEmitter`: throttled partial results for the caller
//! - `FastPathEngine`: the public entry point with its timeout guard

pub mod confirm;
pub mod eligibility;
pub mod engine;
pub mod history;
pub mod knowledge;
pub mod orchestrator;
pub mod progress;
pub mod prompt;
