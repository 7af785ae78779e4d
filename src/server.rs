//! C9 — HTTP listener and routing. Exposes exactly the northbound surface:
//! `/health`, `/v1/models`, `/v1/models/{id}`, `/v1/chat/completions`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::json;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::info;

use crate::auth::{self, ApiKeyGate};
use crate::bedrock::models::ModelCache;
use crate::config::Config;
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::types::ModelsResponse;

#[derive(Clone)]
pub struct AppState {
    pub models: Arc<ModelCache>,
    pub orchestrator: Arc<Orchestrator>,
}

pub struct Server {
    config: Config,
    state: AppState,
    gate: Arc<ApiKeyGate>,
}

impl Server {
    pub fn new(config: Config, state: AppState) -> Self {
        let gate = Arc::new(ApiKeyGate::new(config.api_key.clone()));
        Self { config, state, gate }
    }

    pub async fn run(self) -> Result<()> {
        let app = self.build_router();
        let addr = format!("{}:{}", self.config.listen_host, self.config.listen_port);
        info!(%addr, "omen listening");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }

    fn build_router(&self) -> Router {
        let protected = Router::new()
            .route("/v1/models", get(list_models))
            .route("/v1/models/:id", get(get_model))
            .route("/v1/chat/completions", post(chat_completions))
            .layer(axum::middleware::from_fn_with_state(
                Arc::clone(&self.gate),
                auth::auth_middleware,
            ))
            .with_state(self.state.clone());

        Router::new()
            .route("/health", get(health))
            .merge(protected)
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn list_models(State(state): State<AppState>) -> Response {
    let data = state.models.list().await;
    sorted_json(&ModelsResponse { object: "list", data })
}

async fn get_model(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.models.get(&id).await {
        Some(model) => sorted_json(&model),
        None => crate::error::ProxyError::ModelNotFound(id).into_response(),
    }
}

/// Round-trips through `serde_json::Value` so the response body has its
/// object keys sorted (`serde_json::Map` is a `BTreeMap` without the
/// `preserve_order` feature), per the models surface's serialization rule.
fn sorted_json<T: serde::Serialize>(value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(v) => Json(v).into_response(),
        Err(err) => crate::error::ProxyError::Serialization(err).into_response(),
    }
}

async fn chat_completions(State(state): State<AppState>, body: Bytes) -> Response {
    match state.orchestrator.chat_completions(body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}
