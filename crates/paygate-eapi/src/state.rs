//! Shared application state: `Arc`-wrapped fields cloned
//! cheaply per request, with a custom `Debug` impl that never prints key
//! material.

use std::sync::Arc;

use paygate_core::{AuthTranslator, KeyRing, RevocationRegistry, RotationCoordinator, TokenConfig};
use paygate_store::PostgresRotationStore;
use paygate_vault::{HttpVaultClient, ResilientVaultClient};

use crate::config::EapiConfig;

pub type Vault = ResilientVaultClient<HttpVaultClient>;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthTranslator<Vault>>,
    pub rotation: Arc<RotationCoordinator<Vault, PostgresRotationStore>>,
    pub revocations: Arc<RevocationRegistry>,
    pub keys: Arc<KeyRing>,
    pub token_config: Arc<TokenConfig>,
    pub http: reqwest::Client,
    pub config: Arc<EapiConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
