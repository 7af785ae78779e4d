//! Everything southbound: request translation, response translation, the
//! EventStream frame parser, the SSE encoder, and model resolution.

pub mod client;
pub mod eventstream;
pub mod models;
pub mod response;
pub mod sse;
pub mod translate;

/// Shared stop-reason mapping (§4.3 / §4.5): identical for unary and
/// streaming paths.
pub fn map_stop_reason(stop_reason: &str) -> Option<String> {
    let mapped = match stop_reason {
        "end_turn" => "stop",
        "max_tokens" => "length",
        "tool_use" => "tool_calls",
        "stop_sequence" => "stop",
        other => other,
    };
    Some(mapped.to_string())
}
