//! Shared application state for SAPI.

use std::sync::Arc;

use paygate_core::{KeyRing, RevocationRegistry, TokenConfig};

use crate::config::SapiConfig;
use crate::renewal_client::HttpRenewalClient;

#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<KeyRing>,
    pub token_config: Arc<TokenConfig>,
    pub revocations: Arc<RevocationRegistry>,
    pub renewal_client: Arc<HttpRenewalClient>,
    pub backend_http: reqwest::Client,
    pub config: Arc<SapiConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
