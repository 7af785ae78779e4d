//! C10 — API-key gate. A single static bearer key protects every `/v1/*`
//! route; `/health` bypasses it entirely.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct ApiKeyGate {
    expected: Arc<str>,
}

impl ApiKeyGate {
    pub fn new(expected: String) -> Self {
        Self {
            expected: Arc::from(expected),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        // Constant-time-insensitive: compare full length always, never
        // short-circuit on the first mismatching byte.
        let expected = self.expected.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        let mut diff = 0u8;
        for (a, b) in expected.iter().zip(candidate.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

fn extract_key(request: &Request) -> Option<String> {
    let headers = request.headers();
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(key) = auth.strip_prefix("Bearer ") {
            return Some(key.to_string());
        }
    }
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn auth_middleware(
    State(gate): State<Arc<ApiKeyGate>>,
    request: Request,
    next: Next,
) -> Response {
    match extract_key(&request) {
        Some(key) if gate.matches(&key) => next.run(request).await,
        _ => {
            warn!("rejected request: missing or incorrect api key");
            (
                StatusCode::UNAUTHORIZED,
                axum::Json(json!({
                    "error": {
                        "message": "Incorrect API key provided",
                        "type": "invalid_request_error",
                        "code": "invalid_api_key",
                    }
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_identical_keys() {
        let gate = ApiKeyGate::new("sk-secret".to_string());
        assert!(gate.matches("sk-secret"));
    }

    #[test]
    fn rejects_wrong_length_or_content() {
        let gate = ApiKeyGate::new("sk-secret".to_string());
        assert!(!gate.matches("sk-secre"));
        assert!(!gate.matches("sk-secrets"));
        assert!(!gate.matches("totally-different"));
    }
}
