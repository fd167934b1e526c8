//! Observability for fastpath: subscriber setup and the OTel GenAI
//! attribute names recorded on model-call and tool spans.

pub mod genai_attrs;
pub mod tracing_setup;
