//! C13 — layered configuration: optional TOML file, then environment,
//! then CLI overrides (CLI wins).

use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_region")]
    pub aws_region: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub aws_access_key_id: String,
    #[serde(default)]
    pub aws_secret_access_key: String,
    #[serde(default)]
    pub aws_session_token: Option<String>,
    #[serde(default = "default_model_cache_ttl")]
    pub model_cache_ttl_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_models_timeout")]
    pub models_timeout_seconds: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_host() -> String {
    "127.0.0.1".to_string()
}
fn default_listen_port() -> u16 {
    8080
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_model_cache_ttl() -> u64 {
    300
}
fn default_request_timeout() -> u64 {
    600
}
fn default_models_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            aws_region: default_region(),
            api_key: String::new(),
            aws_access_key_id: String::new(),
            aws_secret_access_key: String::new(),
            aws_session_token: None,
            model_cache_ttl_seconds: default_model_cache_ttl(),
            request_timeout_seconds: default_request_timeout(),
            models_timeout_seconds: default_models_timeout(),
            log_level: default_log_level(),
        }
    }
}

/// CLI overrides applied last, after the file and environment layers.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub listen_host: Option<String>,
    pub listen_port: Option<u16>,
}

impl Config {
    pub fn load(path: Option<&str>, overrides: CliOverrides) -> Result<Self> {
        let mut config = match path.and_then(|p| std::fs::read_to_string(p).ok()) {
            Some(content) => toml::from_str(&content).map_err(|e| ProxyError::Config(e.to_string()))?,
            None => Self::default(),
        };

        config.apply_env_overrides();

        if let Some(host) = overrides.listen_host {
            config.listen_host = host;
        }
        if let Some(port) = overrides.listen_port {
            config.listen_port = port;
        }

        if config.api_key.is_empty() {
            return Err(ProxyError::Config(
                "no API key configured (set `api_key` in the config file or OMEN_API_KEY)".to_string(),
            ));
        }

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("OMEN_LISTEN_HOST") {
            self.listen_host = v;
        }
        if let Ok(v) = std::env::var("OMEN_LISTEN_PORT") {
            if let Ok(port) = v.parse() {
                self.listen_port = port;
            }
        }
        if let Ok(v) = std::env::var("OMEN_API_KEY") {
            self.api_key = v;
        }
        if let Ok(v) = std::env::var("AWS_REGION") {
            self.aws_region = v;
        }
        if let Ok(v) = std::env::var("AWS_ACCESS_KEY_ID") {
            self.aws_access_key_id = v;
        }
        if let Ok(v) = std::env::var("AWS_SECRET_ACCESS_KEY") {
            self.aws_secret_access_key = v;
        }
        if let Ok(v) = std::env::var("AWS_SESSION_TOKEN") {
            self.aws_session_token = Some(v);
        }
        if let Ok(v) = std::env::var("OMEN_MODEL_CACHE_TTL_SECONDS") {
            if let Ok(n) = v.parse() {
                self.model_cache_ttl_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("OMEN_REQUEST_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse() {
                self.request_timeout_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("OMEN_MODELS_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse() {
                self.models_timeout_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("RUST_LOG") {
            self.log_level = v;
        }
    }
}
