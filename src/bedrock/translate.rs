//! C3 — OpenAI Chat Completions request -> Bedrock/Anthropic request.

use crate::error::{ProxyError, Result};
use crate::types::{
    BedrockContentBlock, BedrockMessage, BedrockRequest, BedrockTool, BedrockToolChoice,
    ChatCompletionRequest, ContentPart, MessageContent, ToolChoice, ToolChoiceMode,
    TranslatedRequest, ANTHROPIC_VERSION,
};

const DEFAULT_MAX_TOKENS: u32 = 8192;

pub fn translate(req: &ChatCompletionRequest, bedrock_model_id: &str) -> Result<TranslatedRequest> {
    let is_streaming = req.stream;
    let bedrock_path = format!(
        "/model/{}/{}",
        bedrock_model_id,
        if is_streaming {
            "invoke-with-response-stream"
        } else {
            "invoke"
        }
    );

    let system = req
        .messages
        .iter()
        .filter(|m| m.role == "system")
        .filter_map(|m| m.content.as_ref())
        .map(MessageContent::as_text)
        .collect::<Vec<_>>()
        .join("\n");

    let mut messages = Vec::new();
    for msg in req.messages.iter().filter(|m| m.role != "system") {
        translate_message(msg, &mut messages)?;
    }

    let max_tokens = req
        .max_tokens
        .or(req.max_completion_tokens)
        .unwrap_or(DEFAULT_MAX_TOKENS);

    let stop_sequences = req
        .stop
        .clone()
        .map(|s| s.into_vec())
        .unwrap_or_default();

    let tools = match &req.tools {
        None => None,
        Some(tools) if tools.is_empty() => None,
        Some(tools) => {
            let mut out = Vec::with_capacity(tools.len());
            for (idx, tool) in tools.iter().enumerate() {
                let function = tool.function.as_ref().ok_or_else(|| {
                    ProxyError::InvalidRequest(format!(
                        "tools[{idx}] is missing a function definition"
                    ))
                })?;
                out.push(BedrockTool {
                    name: function.name.clone(),
                    description: function.description.clone(),
                    input_schema: function
                        .parameter_schema
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
                });
            }
            Some(out)
        }
    };

    let tool_choice = req.tool_choice.as_ref().and_then(|tc| match tc {
        ToolChoice::Mode(ToolChoiceMode::Auto) => Some(BedrockToolChoice::Auto),
        ToolChoice::Mode(ToolChoiceMode::None) => None,
        ToolChoice::Mode(ToolChoiceMode::Required) => Some(BedrockToolChoice::Any),
        ToolChoice::Function { function } => Some(BedrockToolChoice::Tool {
            name: function.name.clone(),
        }),
    });

    let bedrock_body = BedrockRequest {
        anthropic_version: ANTHROPIC_VERSION,
        max_tokens,
        system: if system.is_empty() { None } else { Some(system) },
        messages,
        temperature: req.temperature,
        top_p: req.top_p,
        stop_sequences,
        tools,
        tool_choice,
    };

    let include_usage = req
        .stream_options
        .as_ref()
        .map(|o| o.include_usage)
        .unwrap_or(false);

    Ok(TranslatedRequest {
        bedrock_path,
        bedrock_body,
        is_streaming,
        include_usage,
        original_model: req.model.clone(),
    })
}

fn translate_message(
    msg: &crate::types::ChatMessage,
    out: &mut Vec<BedrockMessage>,
) -> Result<()> {
    match msg.role.as_str() {
        "user" => {
            let content = content_to_text_blocks(msg.content.as_ref());
            out.push(BedrockMessage {
                role: "user".to_string(),
                content,
            });
        }
        "assistant" => {
            let mut blocks = content_to_text_blocks(msg.content.as_ref());
            for call in msg.tool_calls.iter().flatten() {
                let input = serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| serde_json::Value::String(call.function.arguments.clone()));
                blocks.push(BedrockContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    input,
                });
            }
            if blocks.is_empty() {
                blocks.push(BedrockContentBlock::Text {
                    text: String::new(),
                });
            }
            out.push(BedrockMessage {
                role: "assistant".to_string(),
                content: blocks,
            });
        }
        "tool" => {
            let tool_use_id = msg.tool_call_id.clone().unwrap_or_default();
            let content = msg
                .content
                .as_ref()
                .map(MessageContent::as_text)
                .unwrap_or_default();
            let block = BedrockContentBlock::ToolResult {
                tool_use_id,
                content,
            };

            let merge_target = out.last_mut().filter(|last| {
                last.role == "user"
                    && !last.content.is_empty()
                    && last
                        .content
                        .iter()
                        .all(|b| matches!(b, BedrockContentBlock::ToolResult { .. }))
            });

            match merge_target {
                Some(last) => last.content.push(block),
                None => out.push(BedrockMessage {
                    role: "user".to_string(),
                    content: vec![block],
                }),
            }
        }
        other => {
            let content = content_to_text_blocks(msg.content.as_ref());
            out.push(BedrockMessage {
                role: other.to_string(),
                content,
            });
        }
    }
    Ok(())
}

fn content_to_text_blocks(content: Option<&MessageContent>) -> Vec<BedrockContentBlock> {
    match content {
        None => vec![],
        Some(MessageContent::Text(text)) if text.is_empty() => vec![],
        Some(MessageContent::Text(text)) => vec![BedrockContentBlock::Text { text: text.clone() }],
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } if text.is_empty() => None,
                ContentPart::Text { text } => Some(BedrockContentBlock::Text { text: text.clone() }),
                ContentPart::ImageUrl { .. } => None,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, ToolCall, ToolCallFunction};

    fn user(content: &str) -> ChatMessage {
        ChatMessage {
            role: "user".to_string(),
            content: Some(MessageContent::Text(content.to_string())),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    #[test]
    fn anthropic_version_is_fixed() {
        let req = ChatCompletionRequest {
            model: "claude".to_string(),
            messages: vec![user("hi")],
            stream: false,
            stream_options: None,
            tools: None,
            tool_choice: None,
            max_tokens: None,
            max_completion_tokens: None,
            temperature: None,
            top_p: None,
            stop: None,
            n: None,
        };
        let out = translate(&req, "anthropic.claude-3").unwrap();
        assert_eq!(out.bedrock_body.anthropic_version, "bedrock-2023-05-31");
        assert!(out.bedrock_path.ends_with("/invoke"));
    }

    #[test]
    fn streaming_path_uses_invoke_with_response_stream() {
        let req = ChatCompletionRequest {
            model: "claude".to_string(),
            messages: vec![user("hi")],
            stream: true,
            stream_options: None,
            tools: None,
            tool_choice: None,
            max_tokens: None,
            max_completion_tokens: None,
            temperature: None,
            top_p: None,
            stop: None,
            n: None,
        };
        let out = translate(&req, "anthropic.claude-3").unwrap();
        assert!(out.bedrock_path.ends_with("/invoke-with-response-stream"));
    }

    #[test]
    fn system_messages_are_extracted_and_excluded_from_messages() {
        let mut req = ChatCompletionRequest {
            model: "claude".to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(MessageContent::Text("You are helpful.".to_string())),
                    tool_calls: None,
                    tool_call_id: None,
                },
                user("Weather?"),
            ],
            stream: false,
            stream_options: None,
            tools: None,
            tool_choice: None,
            max_tokens: None,
            max_completion_tokens: None,
            temperature: None,
            top_p: None,
            stop: None,
            n: None,
        };
        let out = translate(&req, "anthropic.claude-3").unwrap();
        assert_eq!(out.bedrock_body.system.as_deref(), Some("You are helpful."));
        assert_eq!(out.bedrock_body.messages.len(), 1);

        req.messages.push(ChatMessage {
            role: "system".to_string(),
            content: Some(MessageContent::Text("Second.".to_string())),
            tool_calls: None,
            tool_call_id: None,
        });
        let out = translate(&req, "anthropic.claude-3").unwrap();
        assert_eq!(out.bedrock_body.system.as_deref(), Some("You are helpful.\nSecond."));
    }

    #[test]
    fn adjacent_tool_results_merge_into_one_user_message() {
        let req = ChatCompletionRequest {
            model: "claude".to_string(),
            messages: vec![
                user("Weather?"),
                ChatMessage {
                    role: "assistant".to_string(),
                    content: Some(MessageContent::Text(String::new())),
                    tool_calls: Some(vec![ToolCall {
                        id: "call_1".to_string(),
                        kind: "function".to_string(),
                        function: ToolCallFunction {
                            name: "weather".to_string(),
                            arguments: "{\"city\":\"Paris\"}".to_string(),
                        },
                    }]),
                    tool_call_id: None,
                },
                ChatMessage {
                    role: "tool".to_string(),
                    content: Some(MessageContent::Text("Sunny 25C".to_string())),
                    tool_calls: None,
                    tool_call_id: Some("call_1".to_string()),
                },
            ],
            stream: false,
            stream_options: None,
            tools: None,
            tool_choice: None,
            max_tokens: None,
            max_completion_tokens: None,
            temperature: None,
            top_p: None,
            stop: None,
            n: None,
        };
        let out = translate(&req, "anthropic.claude-3").unwrap();
        assert_eq!(out.bedrock_body.messages.len(), 3);
        let last = out.bedrock_body.messages.last().unwrap();
        assert_eq!(last.role, "user");
        match &last.content[..] {
            [BedrockContentBlock::ToolResult { tool_use_id, content }] => {
                assert_eq!(tool_use_id, "call_1");
                assert_eq!(content, "Sunny 25C");
            }
            other => panic!("unexpected content: {other:?}"),
        }

        let assistant_msg = &out.bedrock_body.messages[1];
        match &assistant_msg.content[..] {
            [BedrockContentBlock::ToolUse { input, .. }] => {
                assert_eq!(input, &serde_json::json!({"city": "Paris"}));
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn missing_function_definition_fails_with_offending_index() {
        let req = ChatCompletionRequest {
            model: "claude".to_string(),
            messages: vec![user("hi")],
            stream: false,
            stream_options: None,
            tools: Some(vec![crate::types::Tool {
                kind: "function".to_string(),
                function: None,
            }]),
            tool_choice: None,
            max_tokens: None,
            max_completion_tokens: None,
            temperature: None,
            top_p: None,
            stop: None,
            n: None,
        };
        let err = translate(&req, "anthropic.claude-3").unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRequest(msg) if msg.contains("tools[0]")));
    }
}
