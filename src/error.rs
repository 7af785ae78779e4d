use thiserror::Error;

/// The proxy's single error type. Every variant knows its own HTTP status,
/// OpenAI-shaped `type`, and `code` — the orchestrator never has to guess.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("invalid api key")]
    InvalidApiKey,

    #[error("upstream access denied: {0}")]
    AccessDenied(String),

    #[error("upstream throttled: {0}")]
    Throttled(String),

    #[error("upstream timeout")]
    Timeout,

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Error kind discriminant, exposed for callers that need to branch on the
/// taxonomy (e.g. the retry wrapper) without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    ModelNotFound,
    InvalidApiKey,
    AccessDenied,
    Throttled,
    Timeout,
    UpstreamError,
    Internal,
}

impl ProxyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ProxyError::ModelNotFound(_) => ErrorKind::ModelNotFound,
            ProxyError::InvalidApiKey => ErrorKind::InvalidApiKey,
            ProxyError::AccessDenied(_) => ErrorKind::AccessDenied,
            ProxyError::Throttled(_) => ErrorKind::Throttled,
            ProxyError::Timeout => ErrorKind::Timeout,
            ProxyError::UpstreamError(_) => ErrorKind::UpstreamError,
            ProxyError::Internal(_)
            | ProxyError::HttpClient(_)
            | ProxyError::Serialization(_)
            | ProxyError::Config(_)
            | ProxyError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Maps a non-2xx Bedrock runtime response to the taxonomy in the error
    /// handling design: 403 -> access denied, 429 -> throttled, 408 -> timeout,
    /// 404 -> model not found, everything else -> upstream error.
    pub fn from_bedrock_status(status: u16, message: String) -> Self {
        match status {
            403 => ProxyError::AccessDenied(message),
            404 => ProxyError::ModelNotFound(message),
            408 => ProxyError::Timeout,
            429 => ProxyError::Throttled(message),
            _ => ProxyError::UpstreamError(message),
        }
    }
}

impl axum::response::IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;
        use axum::http::StatusCode;
        use serde_json::json;

        if !matches!(self.kind(), ErrorKind::InvalidRequest | ErrorKind::ModelNotFound | ErrorKind::InvalidApiKey) {
            tracing::error!(error = %self, kind = ?self.kind(), "request failed");
        }

        let (status, error_type, code, message) = match &self {
            ProxyError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error", "invalid_request", msg.clone())
            }
            ProxyError::ModelNotFound(msg) => {
                (StatusCode::NOT_FOUND, "invalid_request_error", "model_not_found", msg.clone())
            }
            ProxyError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_request_error",
                "invalid_api_key",
                "Incorrect API key provided".to_string(),
            ),
            ProxyError::AccessDenied(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error", "server_error", msg.clone())
            }
            ProxyError::Throttled(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error", "rate_limit_exceeded", msg.clone())
            }
            ProxyError::Timeout => (
                StatusCode::REQUEST_TIMEOUT,
                "server_error",
                "timeout",
                "request timed out".to_string(),
            ),
            ProxyError::UpstreamError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error", "server_error", msg.clone())
            }
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "server_error",
                other.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
