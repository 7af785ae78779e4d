//! Bedrock-facing HTTP dispatch: builds runtime/control-plane URLs, signs
//! via the configured [`crate::aws::Signer`], and executes through the
//! shared retrying [`crate::http_client::HttpClient`].

use std::time::Duration;

use bytes::Bytes;
use reqwest::Response;
use serde_json::Value;

use crate::aws::Signer;
use crate::error::{ProxyError, Result};
use crate::http_client::HttpClient;

#[derive(Clone)]
pub struct BedrockClient {
    http: HttpClient,
    signer: Signer,
    region: String,
}

impl BedrockClient {
    pub fn new(http: HttpClient, signer: Signer, region: String) -> Self {
        Self { http, signer, region }
    }

    fn runtime_url(&self, path: &str) -> String {
        format!("https://bedrock-runtime.{}.amazonaws.com{}", self.region, path)
    }

    fn control_url(&self, path: &str) -> String {
        format!("https://bedrock.{}.amazonaws.com{}", self.region, path)
    }

    /// Dispatches a (possibly streaming) `invoke*` call. Returns the raw
    /// response so the orchestrator can branch on status and, for the
    /// streaming path, read the body incrementally.
    pub async fn invoke(&self, path: &str, body: &[u8], streaming: bool, timeout: Duration) -> Result<Response> {
        let url = self.runtime_url(path);
        let accept = if streaming {
            "application/vnd.amazon.eventstream"
        } else {
            "application/json"
        };
        let headers = self.signer.sign(
            "POST",
            &url,
            body,
            &[("content-type", "application/json"), ("accept", accept)],
        )?;
        let body = Bytes::copy_from_slice(body);
        self.http
            .execute_with_retry(
                || {
                    let mut builder = self.http.reqwest().post(&url).body(body.clone());
                    for (name, value) in &headers.0 {
                        builder = builder.header(name, value);
                    }
                    builder
                },
                timeout,
            )
            .await
    }

    /// GETs a control-plane endpoint (foundation-models / inference-profiles
    /// listings) and parses the body as JSON.
    pub async fn get_control_json(&self, path: &str, timeout: Duration) -> Result<Value> {
        let url = self.control_url(path);
        let headers = self.signer.sign("GET", &url, b"", &[("accept", "application/json")])?;
        let response = self
            .http
            .execute_with_retry(
                || {
                    let mut builder = self.http.reqwest().get(&url);
                    for (name, value) in &headers.0 {
                        builder = builder.header(name, value);
                    }
                    builder
                },
                timeout,
            )
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProxyError::from_bedrock_status(status, message));
        }
        response.json().await.map_err(ProxyError::from)
    }
}
