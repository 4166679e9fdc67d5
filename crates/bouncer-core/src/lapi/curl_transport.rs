//! CURL-equivalent transport: a blocking `reqwest::blocking::Client`
//! wrapped in `spawn_blocking` to keep it off the async runtime. Both
//! LAPI transports are reqwest-based; this one differs only in
//! construction (a synchronous client) to model the "inline GET vs
//! external-process-style fetch" split some deployments expect.

use std::sync::Arc;
use std::time::Duration;

use cerberus_common::error::BouncerError;
use cerberus_common::types::Decision;

use super::{classify_status, LapiAuth, LiveQuery, StreamResponse};

pub struct CurlStyleTransport {
    client: Arc<reqwest::blocking::Client>,
    base_url: String,
    api_key: Option<String>,
}

impl CurlStyleTransport {
    pub fn new(
        base_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
        auth: LapiAuth<'_>,
    ) -> Result<Self, BouncerError> {
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(timeout);

        let api_key = match auth {
            LapiAuth::ApiKey(key) => Some(key.to_string()),
            LapiAuth::Mtls {
                cert_path,
                key_path,
                ca_cert_path,
                verify_peer,
            } => {
                let mut pem = std::fs::read(cert_path)
                    .map_err(|e| BouncerError::Config(format!("reading tls cert: {e}")))?;
                let mut key_pem = std::fs::read(key_path)
                    .map_err(|e| BouncerError::Config(format!("reading tls key: {e}")))?;
                pem.append(&mut key_pem);
                let identity = reqwest::Identity::from_pem(&pem)
                    .map_err(|e| BouncerError::Config(format!("invalid tls identity: {e}")))?;
                let ca_pem = std::fs::read(ca_cert_path)
                    .map_err(|e| BouncerError::Config(format!("reading tls ca cert: {e}")))?;
                let ca_cert = reqwest::Certificate::from_pem(&ca_pem)
                    .map_err(|e| BouncerError::Config(format!("invalid tls ca cert: {e}")))?;
                builder = builder
                    .identity(identity)
                    .add_root_certificate(ca_cert)
                    .danger_accept_invalid_certs(!verify_peer);
                None
            }
        };

        let client = builder
            .build()
            .map_err(|e| BouncerError::Config(format!("building LAPI client: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.into(),
            api_key,
        })
    }

    fn blocking_get(&self, path: String) -> Result<String, BouncerError> {
        let mut req = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.header("X-Api-Key", key.clone());
        }
        let resp = req.send().map_err(|e| {
            if e.is_timeout() {
                BouncerError::Timeout(0)
            } else {
                BouncerError::Storage(e.to_string())
            }
        })?;
        let status = resp.status();
        let body = resp.text().map_err(|e| BouncerError::Storage(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), body));
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl super::LapiTransport for CurlStyleTransport {
    async fn get_filtered_decisions(
        &self,
        query: LiveQuery<'_>,
    ) -> Result<Vec<Decision>, BouncerError> {
        let path = match query {
            LiveQuery::Ip(ip) => format!("/v1/decisions?ip={ip}"),
            LiveQuery::ScopeValue { scope, value } => {
                format!("/v1/decisions?scope={scope}&value={value}")
            }
        };
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let api_key = self.api_key.clone();
        let body = tokio::task::spawn_blocking(move || {
            let transport = CurlStyleTransport {
                client,
                base_url,
                api_key,
            };
            transport.blocking_get(path)
        })
        .await
        .map_err(|e| BouncerError::Storage(e.to_string()))??;

        if body.trim().is_empty() || body.trim() == "null" {
            return Ok(Vec::new());
        }
        serde_json::from_str(&body).map_err(|e| BouncerError::Storage(e.to_string()))
    }

    async fn get_streamed_decisions(
        &self,
        startup: bool,
    ) -> Result<(Vec<Decision>, Vec<Decision>), BouncerError> {
        let path = format!("/v1/decisions/stream?startup={startup}");
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let api_key = self.api_key.clone();
        let body = tokio::task::spawn_blocking(move || {
            let transport = CurlStyleTransport {
                client,
                base_url,
                api_key,
            };
            transport.blocking_get(path)
        })
        .await
        .map_err(|e| BouncerError::Storage(e.to_string()))??;

        if body.trim().is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let parsed: StreamResponse =
            serde_json::from_str(&body).map_err(|e| BouncerError::Storage(e.to_string()))?;
        Ok((parsed.new, parsed.deleted))
    }
}
