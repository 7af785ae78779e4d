//! C11 — AWS credential resolution and SigV4 request signing.
//!
//! Credentials are static (config/env), never the full SDK credential chain:
//! this proxy only ever talks to Bedrock with a long-lived key pair or a
//! temporary session token handed in by the surrounding environment.

use std::time::SystemTime;

use aws_credential_types::Credentials;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4::SigningParams;

use crate::error::{ProxyError, Result};

pub const SERVICE_NAME: &str = "bedrock";

/// Headers a signed request must carry, in the order SigV4 produced them.
pub struct SignedHeaders(pub Vec<(String, String)>);

#[derive(Clone)]
pub struct Signer {
    credentials: Credentials,
    region: String,
}

impl Signer {
    pub fn new(
        access_key_id: &str,
        secret_access_key: &str,
        session_token: Option<&str>,
        region: &str,
    ) -> Self {
        let mut builder = Credentials::builder()
            .access_key_id(access_key_id)
            .secret_access_key(secret_access_key)
            .provider_name("omen-static");
        if let Some(token) = session_token {
            builder = builder.session_token(token);
        }
        Self {
            credentials: builder.build(),
            region: region.to_string(),
        }
    }

    /// Signs `method url` with `body` as the payload hash, returning the
    /// header set to attach to the outbound request (Authorization,
    /// X-Amz-Date, X-Amz-Content-Sha256, and X-Amz-Security-Token when the
    /// credentials carry a session token).
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        body: &[u8],
        extra_headers: &[(&str, &str)],
    ) -> Result<SignedHeaders> {
        let identity = self.credentials.clone().into();
        let params = SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(SERVICE_NAME)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| ProxyError::Internal(format!("sigv4 params: {e}")))?
            .into();

        let signable = SignableRequest::new(
            method,
            url,
            extra_headers.iter().copied(),
            SignableBody::Bytes(body),
        )
        .map_err(|e| ProxyError::Internal(format!("sigv4 signable request: {e}")))?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| ProxyError::Internal(format!("sigv4 sign: {e}")))?
            .into_parts();

        let mut request = http::Request::builder()
            .method(method)
            .uri(url)
            .body(())
            .map_err(|e| ProxyError::Internal(format!("sigv4 request scaffold: {e}")))?;
        instructions.apply_to_request_http1x(&mut request);

        let headers = request
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Ok(SignedHeaders(headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_produces_authorization_and_date_headers() {
        let signer = Signer::new("AKIAEXAMPLE", "secretkey", None, "us-east-1");
        let signed = signer
            .sign(
                "POST",
                "https://bedrock-runtime.us-east-1.amazonaws.com/model/anthropic.claude-3/invoke",
                br#"{"hello":"world"}"#,
                &[("content-type", "application/json")],
            )
            .unwrap();

        let names: Vec<&str> = signed.0.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"authorization"));
        assert!(names.contains(&"x-amz-date"));
        assert!(names.contains(&"x-amz-content-sha256"));
        assert!(!names.contains(&"x-amz-security-token"));
    }

    #[test]
    fn session_token_adds_security_token_header() {
        let signer = Signer::new("AKIAEXAMPLE", "secretkey", Some("session-token"), "us-east-1");
        let signed = signer
            .sign(
                "POST",
                "https://bedrock-runtime.us-east-1.amazonaws.com/model/anthropic.claude-3/invoke",
                b"{}",
                &[],
            )
            .unwrap();
        let names: Vec<&str> = signed.0.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"x-amz-security-token"));
    }
}
