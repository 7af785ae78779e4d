//! C2 — model-resolution cache. Backs `/v1/models` and translates a
//! client-supplied model string into the Bedrock runtime id to invoke.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::bedrock::client::BedrockClient;
use crate::error::{ProxyError, Result};
use crate::types::{ModelCacheEntry, ModelInfo};

const FOUNDATION_MODELS_PATH: &str = "/foundation-models?byProvider=Anthropic";
const INFERENCE_PROFILES_PATH: &str = "/inference-profiles?maxResults=1000&typeEquals=SYSTEM_DEFINED";

pub struct ModelCache {
    client: BedrockClient,
    ttl: Duration,
    models_timeout: Duration,
    entry: RwLock<ModelCacheEntry>,
}

impl ModelCache {
    pub fn new(client: BedrockClient, ttl: Duration, models_timeout: Duration) -> Self {
        Self {
            client,
            ttl,
            models_timeout,
            entry: RwLock::new(ModelCacheEntry::default()),
        }
    }

    pub async fn list(&self) -> Vec<ModelInfo> {
        self.ensure_fresh().await;
        self.entry.read().await.models.clone()
    }

    pub async fn get(&self, id: &str) -> Option<ModelInfo> {
        self.ensure_fresh().await;
        self.entry.read().await.models.iter().find(|m| m.id == id).cloned()
    }

    pub async fn resolve(&self, client_model: &str) -> Result<String> {
        let stripped = client_model.strip_prefix("anthropic/").unwrap_or(client_model);

        if stripped.contains("anthropic.") {
            let entry = self.entry.read().await;
            return Ok(apply_inference_profile(stripped, &entry.inference_profiles));
        }

        self.ensure_fresh().await;
        let entry = self.entry.read().await;

        if let Some(base) = entry.client_to_bedrock.get(stripped) {
            return Ok(apply_inference_profile(base, &entry.inference_profiles));
        }

        let normalized = stripped.replace('.', "-");
        let matched = entry.models.iter().find(|m| m.id.starts_with(&normalized));
        match matched {
            Some(model) => {
                let base = entry
                    .client_to_bedrock
                    .get(&model.id)
                    .cloned()
                    .unwrap_or_else(|| model.id.clone());
                Ok(apply_inference_profile(&base, &entry.inference_profiles))
            }
            None => Err(ProxyError::ModelNotFound(client_model.to_string())),
        }
    }

    async fn ensure_fresh(&self) {
        let stale = {
            let entry = self.entry.read().await;
            now_unix() - entry.fetched_at >= self.ttl.as_secs() as i64
        };
        if stale {
            self.repopulate().await;
        }
    }

    async fn repopulate(&self) {
        let (models, client_to_bedrock) = match self.fetch_foundation_models().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "failed to refresh bedrock foundation-model cache");
                return;
            }
        };

        let inference_profiles = self
            .fetch_inference_profiles()
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "failed to refresh bedrock inference-profile cache");
                Default::default()
            });

        let mut entry = self.entry.write().await;
        *entry = ModelCacheEntry {
            models,
            client_to_bedrock,
            inference_profiles,
            fetched_at: now_unix(),
        };
    }

    async fn fetch_foundation_models(
        &self,
    ) -> Result<(Vec<ModelInfo>, std::collections::HashMap<String, String>)> {
        let body = self
            .client
            .get_control_json(FOUNDATION_MODELS_PATH, self.models_timeout)
            .await?;

        let summaries = body
            .get("modelSummaries")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut models = Vec::new();
        let mut client_to_bedrock = std::collections::HashMap::new();

        for summary in &summaries {
            let status = summary
                .get("modelLifecycle")
                .and_then(|l| l.get("status"))
                .and_then(Value::as_str);
            if status != Some("ACTIVE") {
                continue;
            }
            let raw_id = match summary.get("modelId").and_then(Value::as_str) {
                Some(id) => id,
                None => continue,
            };
            let provider = summary
                .get("providerName")
                .and_then(Value::as_str)
                .unwrap_or("anthropic");

            let user_facing_id = derive_user_facing_id(raw_id);
            let created = derive_created(raw_id);

            client_to_bedrock.insert(user_facing_id.clone(), raw_id.to_string());
            models.push(ModelInfo {
                id: user_facing_id,
                object: "model",
                created,
                owned_by: provider.to_lowercase(),
            });
        }

        models.sort_by(|a, b| b.created.cmp(&a.created));
        Ok((models, client_to_bedrock))
    }

    async fn fetch_inference_profiles(&self) -> Result<std::collections::HashMap<String, String>> {
        let body = self
            .client
            .get_control_json(INFERENCE_PROFILES_PATH, self.models_timeout)
            .await?;

        let summaries = body
            .get("inferenceProfileSummaries")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut profiles = std::collections::HashMap::new();
        for summary in &summaries {
            if summary.get("status").and_then(Value::as_str) != Some("ACTIVE") {
                continue;
            }
            let profile_id = match summary.get("inferenceProfileId").and_then(Value::as_str) {
                Some(id) if id.contains("anthropic.") => id,
                _ => continue,
            };
            for model in summary.get("models").and_then(Value::as_array).into_iter().flatten() {
                let arn = match model.get("modelArn").and_then(Value::as_str) {
                    Some(a) => a,
                    None => continue,
                };
                if let Some(bedrock_id) = arn.rsplit('/').next() {
                    profiles.insert(bedrock_id.to_string(), profile_id.to_string());
                }
            }
        }
        Ok(profiles)
    }
}

fn apply_inference_profile(base_id: &str, profiles: &std::collections::HashMap<String, String>) -> String {
    profiles.get(base_id).cloned().unwrap_or_else(|| base_id.to_string())
}

/// Strips a leading `anthropic.` segment and a trailing `-v<digits>:<digits>`
/// version suffix, e.g. `anthropic.claude-3-5-sonnet-20241022-v2:0` ->
/// `claude-3-5-sonnet-20241022`.
fn derive_user_facing_id(raw_id: &str) -> String {
    let stripped = raw_id.strip_prefix("anthropic.").unwrap_or(raw_id);
    trim_version_suffix(stripped).to_string()
}

fn trim_version_suffix(s: &str) -> &str {
    let Some(idx) = s.rfind("-v") else { return s };
    let tail = &s[idx + 2..];
    let Some(colon) = tail.find(':') else { return s };
    let (digits_before, rest) = tail.split_at(colon);
    let digits_after = &rest[1..];
    let valid = !digits_before.is_empty()
        && digits_before.bytes().all(|b| b.is_ascii_digit())
        && !digits_after.is_empty()
        && digits_after.bytes().all(|b| b.is_ascii_digit());
    if valid {
        &s[..idx]
    } else {
        s
    }
}

/// Scans for the first 8-digit run in `raw_id` and interprets it as
/// `YYYYMMDD`, converting to Unix seconds via the proleptic Gregorian
/// calendar. Returns 0 if no valid date is embedded.
fn derive_created(raw_id: &str) -> i64 {
    let bytes = raw_id.as_bytes();
    for start in 0..bytes.len() {
        if start + 8 > bytes.len() {
            break;
        }
        let window = &bytes[start..start + 8];
        if !window.iter().all(u8::is_ascii_digit) {
            continue;
        }
        let digits = &raw_id[start..start + 8];
        let year: i32 = digits[0..4].parse().unwrap();
        let month: u32 = digits[4..6].parse().unwrap();
        let day: u32 = digits[6..8].parse().unwrap();
        if !(1970..=2100).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            continue;
        }
        if let Some(date) = chrono::NaiveDate::from_ymd_opt(year, month, day) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return dt.and_utc().timestamp();
            }
        }
    }
    0
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
