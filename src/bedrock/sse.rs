//! C6 — stateful translator from decoded Anthropic streaming events to
//! OpenAI-compatible SSE lines.

use crate::error::{ProxyError, Result};
use crate::types::{
    ChatChoiceDelta, ChatCompletionChunk, ChatMessageDelta, StreamState, ToolCallChunk,
    ToolCallFunctionChunk, Usage,
};
use serde_json::Value;

pub const DONE_LINE: &str = "data: [DONE]\n\n";

/// Owns the `StreamState` (created lazily on the first `message_start`) and
/// turns each decoded event into zero or more `data: ...\n\n` lines.
pub struct StreamEncoder {
    state: Option<StreamState>,
    original_model: String,
    include_usage: bool,
}

impl StreamEncoder {
    pub fn new(original_model: String, include_usage: bool) -> Self {
        Self {
            state: None,
            original_model,
            include_usage,
        }
    }

    pub fn encode(&mut self, event: &Value) -> Result<Vec<String>> {
        match event.get("type").and_then(Value::as_str) {
            Some("message_start") => self.on_message_start(event),
            Some("content_block_start") => self.on_content_block_start(event),
            Some("content_block_delta") => self.on_content_block_delta(event),
            Some("content_block_stop") => self.on_content_block_stop(),
            Some("message_delta") => self.on_message_delta(event),
            Some("message_stop") => self.on_message_stop(),
            _ => Ok(vec![]),
        }
    }

    fn state_mut(&mut self) -> &mut StreamState {
        self.state.as_mut().expect("state created by message_start before any other event")
    }

    fn on_message_start(&mut self, event: &Value) -> Result<Vec<String>> {
        let message = event.get("message");
        let chunk_id = message
            .and_then(|m| m.get("id"))
            .and_then(Value::as_str)
            .map(|id| format!("chatcmpl-{id}"))
            .unwrap_or_else(|| format!("chatcmpl-{}", uuid::Uuid::new_v4()));
        let input_tokens = message
            .and_then(|m| m.get("usage"))
            .and_then(|u| u.get("input_tokens"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;

        let mut state = StreamState::new(
            chunk_id,
            self.original_model.clone(),
            chrono::Utc::now().timestamp(),
            self.include_usage,
        );
        state.input_tokens = input_tokens;
        self.state = Some(state);

        let delta = ChatMessageDelta {
            role: Some("assistant"),
            content: Some(String::new()),
            tool_calls: None,
        };
        Ok(vec![self.emit_chunk(delta, None)])
    }

    fn on_content_block_start(&mut self, event: &Value) -> Result<Vec<String>> {
        let block = event.get("content_block");
        let kind = block.and_then(|b| b.get("type")).and_then(Value::as_str);
        if kind != Some("tool_use") {
            self.state_mut().current_block_is_tool_use = false;
            return Ok(vec![]);
        }

        self.state_mut().current_block_is_tool_use = true;
        let index = self.state_mut().tool_call_index;
        let id = block.and_then(|b| b.get("id")).and_then(Value::as_str).map(str::to_string);
        let name = block.and_then(|b| b.get("name")).and_then(Value::as_str).map(str::to_string);

        let delta = ChatMessageDelta {
            role: None,
            content: None,
            tool_calls: Some(vec![ToolCallChunk {
                index,
                id,
                kind: Some("function"),
                function: ToolCallFunctionChunk {
                    name,
                    arguments: Some(String::new()),
                },
            }]),
        };
        Ok(vec![self.emit_chunk(delta, None)])
    }

    fn on_content_block_delta(&mut self, event: &Value) -> Result<Vec<String>> {
        let delta_obj = event.get("delta");
        match delta_obj.and_then(|d| d.get("type")).and_then(Value::as_str) {
            Some("text_delta") => {
                let text = delta_obj
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let delta = ChatMessageDelta {
                    role: Some("assistant"),
                    content: Some(text),
                    tool_calls: None,
                };
                Ok(vec![self.emit_chunk(delta, None)])
            }
            Some("input_json_delta") => {
                let partial = delta_obj
                    .and_then(|d| d.get("partial_json"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let index = self.state_mut().tool_call_index;
                let delta = ChatMessageDelta {
                    role: None,
                    content: None,
                    tool_calls: Some(vec![ToolCallChunk {
                        index,
                        id: None,
                        kind: None,
                        function: ToolCallFunctionChunk {
                            name: None,
                            arguments: Some(partial),
                        },
                    }]),
                };
                Ok(vec![self.emit_chunk(delta, None)])
            }
            _ => Ok(vec![]),
        }
    }

    fn on_content_block_stop(&mut self) -> Result<Vec<String>> {
        let state = self.state_mut();
        if state.current_block_is_tool_use {
            state.tool_call_index += 1;
            state.current_block_is_tool_use = false;
        }
        Ok(vec![])
    }

    fn on_message_delta(&mut self, event: &Value) -> Result<Vec<String>> {
        if let Some(output_tokens) = event
            .get("usage")
            .and_then(|u| u.get("output_tokens"))
            .and_then(Value::as_u64)
        {
            self.state_mut().output_tokens = output_tokens as u32;
        }
        let stop_reason = event
            .get("delta")
            .and_then(|d| d.get("stop_reason"))
            .and_then(Value::as_str);
        let finish_reason = stop_reason.and_then(crate::bedrock::map_stop_reason);

        let delta = ChatMessageDelta {
            role: Some("assistant"),
            content: None,
            tool_calls: None,
        };
        Ok(vec![self.emit_chunk(delta, finish_reason)])
    }

    fn on_message_stop(&mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        let state = self.state_mut();
        if state.include_usage {
            let usage = Usage {
                prompt_tokens: state.input_tokens,
                completion_tokens: state.output_tokens,
                total_tokens: state.input_tokens + state.output_tokens,
            };
            let chunk = ChatCompletionChunk {
                id: state.chunk_id.clone(),
                object: "chat.completion.chunk",
                created: state.created,
                model: state.model.clone(),
                choices: vec![],
                usage: Some(usage),
            };
            lines.push(format!(
                "data: {}\n\n",
                serde_json::to_string(&chunk).map_err(ProxyError::Serialization)?
            ));
        }
        lines.push(DONE_LINE.to_string());
        Ok(lines)
    }

    fn emit_chunk(&mut self, delta: ChatMessageDelta, finish_reason: Option<String>) -> String {
        let state = self.state.as_ref().expect("state created by message_start");
        let chunk = ChatCompletionChunk {
            id: state.chunk_id.clone(),
            object: "chat.completion.chunk",
            created: state.created,
            model: state.model.clone(),
            choices: vec![ChatChoiceDelta {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        };
        format!("data: {}\n\n", serde_json::to_string(&chunk).expect("chunk is always serializable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn s3_streaming_with_usage() {
        let mut encoder = StreamEncoder::new("claude-sonnet".to_string(), true);
        let mut lines = Vec::new();

        lines.extend(
            encoder
                .encode(&json!({"type": "message_start", "message": {"id": "msg_1", "usage": {"input_tokens": 100}}}))
                .unwrap(),
        );
        lines.extend(
            encoder
                .encode(&json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text"}}))
                .unwrap(),
        );
        for text in ["Hey", "! I'm doing great", ", thanks for asking."] {
            lines.extend(
                encoder
                    .encode(&json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}}))
                    .unwrap(),
            );
        }
        lines.extend(encoder.encode(&json!({"type": "content_block_stop", "index": 0})).unwrap());
        lines.extend(
            encoder
                .encode(&json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 15}}))
                .unwrap(),
        );
        lines.extend(encoder.encode(&json!({"type": "message_stop"})).unwrap());

        // 1 open + 3 text + 1 finish + 1 usage + [DONE]
        assert_eq!(lines.len(), 7);
        assert!(lines[0].contains("\"content\":\"\""));
        assert!(lines[1].contains("Hey"));
        assert!(lines[3].contains("thanks for asking"));
        assert!(lines[4].contains("\"finish_reason\":\"stop\""));
        assert!(lines[5].contains("\"total_tokens\":115"));
        assert!(lines[5].contains("\"choices\":[]"));
        assert_eq!(lines[6], DONE_LINE);

        // id/model/created constant across all non-sentinel chunks.
        let ids: Vec<Value> = lines[..6]
            .iter()
            .map(|l| {
                let json_part = l.trim_start_matches("data: ").trim_end();
                serde_json::from_str::<Value>(json_part).unwrap()
            })
            .collect();
        let first_id = &ids[0]["id"];
        let first_model = &ids[0]["model"];
        let first_created = &ids[0]["created"];
        for v in &ids {
            assert_eq!(&v["id"], first_id);
            assert_eq!(&v["model"], first_model);
            assert_eq!(&v["created"], first_created);
        }
    }

    #[test]
    fn unknown_event_type_yields_nothing() {
        let mut encoder = StreamEncoder::new("claude".to_string(), false);
        encoder
            .encode(&json!({"type": "message_start", "message": {}}))
            .unwrap();
        let out = encoder.encode(&json!({"type": "totally_unknown"})).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn message_stop_without_include_usage_only_emits_done() {
        let mut encoder = StreamEncoder::new("claude".to_string(), false);
        encoder
            .encode(&json!({"type": "message_start", "message": {}}))
            .unwrap();
        let out = encoder.encode(&json!({"type": "message_stop"})).unwrap();
        assert_eq!(out, vec![DONE_LINE.to_string()]);
    }

    #[test]
    fn tool_call_index_advances_after_content_block_stop() {
        let mut encoder = StreamEncoder::new("claude".to_string(), false);
        encoder
            .encode(&json!({"type": "message_start", "message": {}}))
            .unwrap();
        encoder
            .encode(&json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "t1", "name": "weather"}}))
            .unwrap();
        encoder.encode(&json!({"type": "content_block_stop", "index": 0})).unwrap();
        let out = encoder
            .encode(&json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "t2", "name": "time"}}))
            .unwrap();
        assert!(out[0].contains("\"index\":1"));
    }
}
