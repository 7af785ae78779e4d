//! C7 — the chat-completions pipeline: decode, validate, resolve (C2),
//! translate (C3), sign + dispatch (C11/C12), then either the unary (C4) or
//! streaming (C5/C6) path.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use crate::bedrock::client::BedrockClient;
use crate::bedrock::eventstream::EventStreamDecoder;
use crate::bedrock::models::ModelCache;
use crate::bedrock::sse::StreamEncoder;
use crate::bedrock::{response as response_translate, translate};
use crate::error::{ProxyError, Result};
use crate::types::ChatCompletionRequest;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const HEARTBEAT_LINE: &[u8] = b": processing\n\n";

pub struct Orchestrator {
    models: Arc<ModelCache>,
    client: BedrockClient,
    request_timeout: Duration,
}

impl Orchestrator {
    pub fn new(models: Arc<ModelCache>, client: BedrockClient, request_timeout: Duration) -> Self {
        Self {
            models,
            client,
            request_timeout,
        }
    }

    pub async fn chat_completions(&self, body: Bytes) -> Result<Response> {
        if body.len() > MAX_BODY_BYTES {
            return Err(ProxyError::InvalidRequest(
                "request body exceeds the 10 MiB limit".to_string(),
            ));
        }

        let req: ChatCompletionRequest = serde_json::from_slice(&body)
            .map_err(|e| ProxyError::InvalidRequest(format!("invalid JSON body: {e}")))?;

        if req.model.trim().is_empty() {
            return Err(ProxyError::InvalidRequest("model must not be empty".to_string()));
        }
        if req.messages.is_empty() {
            return Err(ProxyError::InvalidRequest("messages must not be empty".to_string()));
        }

        let bedrock_model_id = self.models.resolve(&req.model).await?;
        let translated = translate::translate(&req, &bedrock_model_id)?;
        let bedrock_body =
            serde_json::to_vec(&translated.bedrock_body).map_err(ProxyError::Serialization)?;

        let upstream = self
            .client
            .invoke(
                &translated.bedrock_path,
                &bedrock_body,
                translated.is_streaming,
                self.request_timeout,
            )
            .await?;

        if !upstream.status().is_success() {
            let status = upstream.status().as_u16();
            let bytes = upstream.bytes().await.unwrap_or_default();
            let message = extract_error_message(&bytes);
            return Err(ProxyError::from_bedrock_status(status, message));
        }

        if translated.is_streaming {
            Ok(stream_response(
                upstream,
                translated.original_model,
                translated.include_usage,
            ))
        } else {
            let bytes = upstream.bytes().await.map_err(ProxyError::from)?;
            let bedrock_json: Value =
                serde_json::from_slice(&bytes).map_err(ProxyError::Serialization)?;
            let now = chrono::Utc::now().timestamp();
            let out = response_translate::translate(&bedrock_json, &translated.original_model, now)?;
            Ok(axum::Json(out).into_response())
        }
    }
}

fn stream_response(upstream: reqwest::Response, original_model: String, include_usage: bool) -> Response {
    let (tx, rx) = mpsc::channel::<std::result::Result<Bytes, io::Error>>(32);
    let heartbeat_cancel = CancellationToken::new();

    tokio::spawn(run_heartbeat(tx.clone(), heartbeat_cancel.clone()));
    tokio::spawn(produce_stream_events(
        upstream,
        original_model,
        include_usage,
        tx,
        heartbeat_cancel,
    ));

    let body = Body::from_stream(ReceiverStream::new(rx));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .expect("static response headers are always valid")
}

async fn run_heartbeat(
    tx: mpsc::Sender<std::result::Result<Bytes, io::Error>>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    interval.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                if tx.send(Ok(Bytes::from_static(HEARTBEAT_LINE))).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn produce_stream_events(
    upstream: reqwest::Response,
    original_model: String,
    include_usage: bool,
    tx: mpsc::Sender<std::result::Result<Bytes, io::Error>>,
    heartbeat_cancel: CancellationToken,
) {
    let byte_stream = upstream
        .bytes_stream()
        .map(|r| r.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
    let reader = StreamReader::new(byte_stream);
    let mut frames = FramedRead::new(reader, EventStreamDecoder);
    let mut encoder = StreamEncoder::new(original_model, include_usage);
    let mut heartbeat_silenced = false;

    while let Some(frame) = frames.next().await {
        let raw_event = match frame {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "eventstream frame error, terminating stream");
                break;
            }
        };

        if !heartbeat_silenced {
            heartbeat_cancel.cancel();
            heartbeat_silenced = true;
        }

        let event: Value = match serde_json::from_slice(&raw_event) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "malformed streaming event payload, terminating stream");
                break;
            }
        };

        let lines = match encoder.encode(&event) {
            Ok(lines) => lines,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode streaming event, terminating stream");
                break;
            }
        };

        for line in lines {
            if tx.send(Ok(Bytes::from(line))).await.is_err() {
                heartbeat_cancel.cancel();
                return;
            }
        }
    }

    heartbeat_cancel.cancel();
}

fn extract_error_message(body: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return String::from_utf8_lossy(body).into_owned();
    };
    value
        .get("message")
        .or_else(|| value.get("Message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_lowercase_message_field() {
        let body = br#"{"message": "model not ready"}"#;
        assert_eq!(extract_error_message(body), "model not ready");
    }

    #[test]
    fn extracts_uppercase_message_field_as_fallback() {
        let body = br#"{"Message": "access denied"}"#;
        assert_eq!(extract_error_message(body), "access denied");
    }

    #[test]
    fn falls_back_to_raw_body_when_not_json() {
        assert_eq!(extract_error_message(b"not json"), "not json");
    }
}
