//! HTTP implementation of `paygate_core::RenewalClient` — the concrete piece that breaks the EAPI↔SAPI dependency cycle: no
//! shared library type crosses the process boundary here, only a plain
//! HTTP POST against EAPI's renewal endpoint.

use async_trait::async_trait;
use paygate_core::RenewalClient;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct RenewRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct RenewResponse {
    token: String,
}

pub struct HttpRenewalClient {
    http: reqwest::Client,
    eapi_base_url: String,
}

impl HttpRenewalClient {
    #[must_use]
    pub fn new(http: reqwest::Client, eapi_base_url: impl Into<String>) -> Self {
        Self { http, eapi_base_url: eapi_base_url.into() }
    }
}

#[async_trait]
impl RenewalClient for HttpRenewalClient {
    async fn renew(&self, expired_token_string: &str) -> Option<String> {
        let url = format!("{}/internal/v1/tokens/renew", self.eapi_base_url);
        let resp = self
            .http
            .post(url)
            .json(&RenewRequest { token: expired_token_string })
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json::<RenewResponse>().await.ok().map(|body| body.token)
    }
}
