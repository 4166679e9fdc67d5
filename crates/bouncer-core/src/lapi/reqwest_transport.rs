//! Plain HTTP transport: an async `reqwest::Client` issuing inline GET
//! requests. One of two interchangeable executors behind `LapiTransport`.

use std::time::Duration;

use cerberus_common::error::BouncerError;
use cerberus_common::types::Decision;

use super::{classify_status, LapiAuth, LiveQuery, StreamResponse};

pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ReqwestTransport {
    pub fn new(
        base_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
        auth: LapiAuth<'_>,
    ) -> Result<Self, BouncerError> {
        let mut builder = reqwest::Client::builder()
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
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.header("X-Api-Key", key);
        }
        req
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String, BouncerError> {
        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                BouncerError::Timeout(0)
            } else {
                BouncerError::Storage(e.to_string())
            }
        })?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| BouncerError::Storage(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), body));
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl super::LapiTransport for ReqwestTransport {
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
        let body = self.send(self.request(&path)).await?;
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
        let body = self.send(self.request(&path)).await?;
        if body.trim().is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let parsed: StreamResponse =
            serde_json::from_str(&body).map_err(|e| BouncerError::Storage(e.to_string()))?;
        Ok((parsed.new, parsed.deleted))
    }
}
