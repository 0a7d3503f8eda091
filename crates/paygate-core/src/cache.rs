//! `TokenCache`.
//!
//! Built directly on `paygate_vault::TtlCache`, the same sharded-lock cache
//! `CredentialCache` uses — both share the same
//! `get/put/evict/evict_by_prefix` interface.

use crate::model::Token;

/// TTL-bounded mapping from a cache key (`clientId`, or
/// `clientId`+permission set via [`crate::model::token_cache_key`]) to a
/// live [`Token`].
pub type TokenCache = paygate_vault::TtlCache<Token>;
