//! The [`VaultClient`] trait and its HTTP implementation.
//!
//! The vault is an external system the gateway does not own;
//! this trait is the seam between the gateway's domain logic and whatever
//! wire protocol the vault actually speaks, separating the credential-store
//! abstraction from its backends.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::model::{ClientCredential, CredentialVersion};

/// Operations the gateway needs from the credential vault.
///
/// Every method maps 1:1 onto a vault HTTP endpoint in [`HttpVaultClient`],
/// but the trait exists so the resilience decorator and tests can swap in a
/// fake without touching call sites.
#[async_trait]
pub trait VaultClient: Send + Sync {
    /// Fetch a client's full credential record, including deprecated and
    /// disabled versions.
    async fn get_credential(&self, client_id: &str) -> Result<ClientCredential, VaultError>;

    /// Fetch only the versions currently eligible to authenticate
    /// (`ACTIVE` or `DEPRECATED`). A narrower, cheaper read than
    /// `get_credential` used on the hot authentication path.
    async fn get_active_credential_versions(
        &self,
        client_id: &str,
    ) -> Result<Vec<CredentialVersion>, VaultError>;

    /// Store a newly minted credential version with status `ACTIVE`.
    async fn store_new_credential_version(
        &self,
        client_id: &str,
        hashed_secret: &str,
        salt: &str,
    ) -> Result<CredentialVersion, VaultError>;

    /// Set which versions are considered authenticatable: `primary_version_id`
    /// becomes `ACTIVE`; `secondary_version_id`, if given, becomes `ACTIVE`
    /// as well.
    /// When `secondary_version_id` is `None`, `primary_version_id` becomes
    /// the sole active version — used to restore pre-rotation state on
    /// cancel.
    async fn configure_credential_transition(
        &self,
        client_id: &str,
        primary_version_id: &str,
        secondary_version_id: Option<&str>,
    ) -> Result<(), VaultError>;

    /// Set a version's status to `DISABLED`. It remains stored but is no
    /// longer authenticatable.
    async fn disable_credential_version(
        &self,
        client_id: &str,
        version_id: &str,
    ) -> Result<(), VaultError>;

    /// Permanently delete a version's record from the vault.
    async fn remove_credential_version(
        &self,
        client_id: &str,
        version_id: &str,
    ) -> Result<(), VaultError>;
}

/// HTTP client for the vault's REST API, authenticated via mutual TLS.
///
/// The vault's wire format is not specified beyond "an external system";
/// this implementation assumes a small JSON REST API built around the
/// named vault operations: store, configure transition, disable, remove.
pub struct HttpVaultClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpVaultClient {
    /// Build a client whose outbound requests present the given client
    /// identity certificate and private key (PEM, concatenated) for mTLS.
    pub fn new(base_url: impl Into<String>, identity_pem: &[u8]) -> Result<Self, VaultError> {
        let identity = reqwest::Identity::from_pem(identity_pem)
            .map_err(|e| VaultError::AuthFailure(format!("invalid client identity: {e}")))?;
        let http = reqwest::Client::builder()
            .identity(identity)
            .timeout(Duration::from_secs(10))
            .use_rustls_tls()
            .build()
            .map_err(|e| VaultError::TransientIo(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn translate_status(resp: reqwest::Response, context: &str) -> Result<reqwest::Response, VaultError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(VaultError::AuthFailure(format!("{context}: {body}"))),
            404 => Err(VaultError::NotFound(format!("{context}: {body}"))),
            409 => Err(VaultError::Conflict(format!("{context}: {body}"))),
            _ => Err(VaultError::TransientIo(format!(
                "{context}: http {status}: {body}"
            ))),
        }
    }
}

#[derive(Serialize)]
struct StoreVersionRequest<'a> {
    hashed_secret: &'a str,
    salt: &'a str,
}

#[derive(Serialize)]
struct ConfigureTransitionRequest<'a> {
    primary_version_id: &'a str,
    secondary_version_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct ActiveVersionsResponse {
    versions: Vec<CredentialVersion>,
}

#[async_trait]
impl VaultClient for HttpVaultClient {
    async fn get_credential(&self, client_id: &str) -> Result<ClientCredential, VaultError> {
        let resp = self
            .http
            .get(self.url(&format!("/v1/credentials/{client_id}")))
            .send()
            .await
            .map_err(|e| VaultError::TransientIo(e.to_string()))?;
        let resp = Self::translate_status(resp, "get_credential").await?;
        resp.json()
            .await
            .map_err(|e| VaultError::TransientIo(format!("malformed vault response: {e}")))
    }

    async fn get_active_credential_versions(
        &self,
        client_id: &str,
    ) -> Result<Vec<CredentialVersion>, VaultError> {
        let resp = self
            .http
            .get(self.url(&format!("/v1/credentials/{client_id}/active-versions")))
            .send()
            .await
            .map_err(|e| VaultError::TransientIo(e.to_string()))?;
        let resp = Self::translate_status(resp, "get_active_credential_versions").await?;
        let body: ActiveVersionsResponse = resp
            .json()
            .await
            .map_err(|e| VaultError::TransientIo(format!("malformed vault response: {e}")))?;
        Ok(body.versions)
    }

    async fn store_new_credential_version(
        &self,
        client_id: &str,
        hashed_secret: &str,
        salt: &str,
    ) -> Result<CredentialVersion, VaultError> {
        let resp = self
            .http
            .post(self.url(&format!("/v1/credentials/{client_id}/versions")))
            .json(&StoreVersionRequest { hashed_secret, salt })
            .send()
            .await
            .map_err(|e| VaultError::TransientIo(e.to_string()))?;
        let resp = Self::translate_status(resp, "store_new_credential_version").await?;
        resp.json()
            .await
            .map_err(|e| VaultError::TransientIo(format!("malformed vault response: {e}")))
    }

    async fn configure_credential_transition(
        &self,
        client_id: &str,
        primary_version_id: &str,
        secondary_version_id: Option<&str>,
    ) -> Result<(), VaultError> {
        let resp = self
            .http
            .post(self.url(&format!("/v1/credentials/{client_id}/transition")))
            .json(&ConfigureTransitionRequest {
                primary_version_id,
                secondary_version_id,
            })
            .send()
            .await
            .map_err(|e| VaultError::TransientIo(e.to_string()))?;
        Self::translate_status(resp, "configure_credential_transition").await?;
        Ok(())
    }

    async fn disable_credential_version(
        &self,
        client_id: &str,
        version_id: &str,
    ) -> Result<(), VaultError> {
        let resp = self
            .http
            .post(self.url(&format!(
                "/v1/credentials/{client_id}/versions/{version_id}/disable"
            )))
            .send()
            .await
            .map_err(|e| VaultError::TransientIo(e.to_string()))?;
        Self::translate_status(resp, "disable_credential_version").await?;
        Ok(())
    }

    async fn remove_credential_version(
        &self,
        client_id: &str,
        version_id: &str,
    ) -> Result<(), VaultError> {
        let resp = self
            .http
            .delete(self.url(&format!(
                "/v1/credentials/{client_id}/versions/{version_id}"
            )))
            .send()
            .await
            .map_err(|e| VaultError::TransientIo(e.to_string()))?;
        Self::translate_status(resp, "remove_credential_version").await?;
        Ok(())
    }
}
