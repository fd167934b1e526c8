//! Infrastructure layer for fastpath.
//!
//! Contains implementations of the port traits defined in `fastpath-core`:
//! the Gemini streaming client and context cache, plus the configuration
//! loader that reads `fastpath.toml` and environment overrides.

pub mod config;
pub mod llm;
