//! C4 — Bedrock/Anthropic unary response -> OpenAI Chat Completion.

use crate::error::{ProxyError, Result};
use crate::types::{
    ChatChoice, ChatCompletionResponse, ChatResponseMessage, ToolCallFunctionOut, ToolCallOut,
    Usage,
};
use serde_json::Value;

pub fn translate(bedrock_response: &Value, original_model: &str, now: i64) -> Result<ChatCompletionResponse> {
    let id = bedrock_response
        .get("id")
        .and_then(Value::as_str)
        .map(|s| format!("chatcmpl-{s}"))
        .unwrap_or_else(|| format!("chatcmpl-{}", uuid::Uuid::new_v4()));

    let content_blocks = bedrock_response
        .get("content")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let text = content_blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect::<String>();
    let content = if text.is_empty() && !content_blocks.iter().any(|b| b.get("type").and_then(Value::as_str) == Some("text")) {
        None
    } else {
        Some(text)
    };

    let tool_calls: Vec<ToolCallOut> = content_blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
        .map(|b| -> Result<ToolCallOut> {
            let id = b
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let name = b
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let input = b.get("input").cloned().unwrap_or(Value::Null);
            let arguments = serde_json::to_string(&input).map_err(ProxyError::Serialization)?;
            Ok(ToolCallOut {
                id,
                kind: "function",
                function: ToolCallFunctionOut { name, arguments },
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let tool_calls = if tool_calls.is_empty() { None } else { Some(tool_calls) };

    let stop_reason = bedrock_response.get("stop_reason").and_then(Value::as_str);
    let finish_reason = stop_reason.and_then(crate::bedrock::map_stop_reason);

    let usage = match (
        bedrock_response.get("usage").and_then(|u| u.get("input_tokens")).and_then(Value::as_u64),
        bedrock_response.get("usage").and_then(|u| u.get("output_tokens")).and_then(Value::as_u64),
    ) {
        (Some(input), Some(output)) => Some(Usage {
            prompt_tokens: input as u32,
            completion_tokens: output as u32,
            total_tokens: (input + output) as u32,
        }),
        _ => None,
    };

    Ok(ChatCompletionResponse {
        id,
        object: "chat.completion",
        created: now,
        model: original_model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatResponseMessage {
                role: "assistant",
                content,
                tool_calls,
            },
            finish_reason,
        }],
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn s1_unary_hello() {
        let bedrock = json!({
            "id": "msg_abc",
            "content": [{"type": "text", "text": "Hi!"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 18},
        });
        let out = translate(&bedrock, "claude-sonnet-4-5-20250514", 0).unwrap();
        assert_eq!(out.id, "chatcmpl-msg_abc");
        assert_eq!(out.choices[0].message.content.as_deref(), Some("Hi!"));
        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("stop"));
        let usage = out.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 18);
        assert_eq!(usage.total_tokens, 30);
    }

    #[test]
    fn tool_use_blocks_become_tool_calls() {
        let bedrock = json!({
            "id": "msg_1",
            "content": [{"type": "tool_use", "id": "call_1", "name": "weather", "input": {"city": "Paris"}}],
            "stop_reason": "tool_use",
        });
        let out = translate(&bedrock, "claude", 0).unwrap();
        assert!(out.choices[0].message.content.is_none());
        let calls = out.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "weather");
        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn missing_usage_omits_usage_field() {
        let bedrock = json!({"content": [], "stop_reason": "end_turn"});
        let out = translate(&bedrock, "claude", 0).unwrap();
        assert!(out.usage.is_none());
    }
}
