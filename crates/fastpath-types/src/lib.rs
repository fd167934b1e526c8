//! Shared domain types for the fastpath turn engine.
//!
//! This crate contains the request-scoped data shapes used across the
//! workspace: turn requests and results, model stream chunks, tool results,
//! progress events, and the engine configuration.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, thiserror.

pub mod config;
pub mod group;
pub mod llm;
pub mod progress;
pub mod tool;
pub mod turn;
