//! Turn orchestration and port trait definitions for the fastpath engine.
//!
//! This crate defines the "ports" (model client, context cache, knowledge
//! source, tool handlers) that the infrastructure layer implements, plus the
//! engine that drives one conversational turn through them. It depends on
//! `fastpath-types` and on `fastpath-observe` for span attribute names --
//! never on `fastpath-infra` or any network crate.

pub mod agent;
pub mod llm;
pub mod text;
pub mod tool;
