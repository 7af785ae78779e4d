//! OMEN - Open Model Exchange Network
//!
//! A stateless reverse proxy that translates the OpenAI Chat Completions API
//! into Amazon Bedrock's Anthropic-on-Bedrock runtime API and back.

pub mod auth;
pub mod aws;
pub mod bedrock;
pub mod config;
pub mod error;
pub mod http_client;
pub mod orchestrator;
pub mod server;
pub mod types;

pub use config::Config;
pub use error::{ProxyError, Result};
pub use server::Server;
pub use types::*;

/// Initialize OMEN's tracing/logging subsystem.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omen=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
