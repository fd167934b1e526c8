//! OpenTelemetry GenAI Semantic Convention attribute names.
//!
//! `tracing` macros need literal field names, so spans declare these fields
//! inline (as `field::Empty` where filled later) and use the constants when
//! recording values after the fact.

/// The number of input tokens consumed.
pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";

/// The number of output tokens generated.
pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

/// Input tokens served from a cached prefix.
pub const GEN_AI_USAGE_CACHED_TOKENS: &str = "gen_ai.usage.cached_tokens";

/// Function calls the model requested in one response.
pub const GEN_AI_RESPONSE_FUNCTION_CALLS: &str = "gen_ai.response.function_calls";
