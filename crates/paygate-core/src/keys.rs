//! Signing and verification key material.
//!
//! Key bytes are wrapped in a newtype that zeroizes on drop and never
//! implements `Debug`/`Display` in a way that could leak them into logs.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// An HMAC-SHA256 key used to either sign or verify tokens.
///
/// Only the bytes are stored; a key carries no opinion about whether it is
/// currently the active signer or a retained verifier — that's
/// [`KeyRing`]'s job.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct HmacKey(Vec<u8>);

impl HmacKey {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub(crate) fn sign(&self, message: &[u8]) -> Vec<u8> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.0)
            .expect("HMAC accepts keys of any length");
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }

    pub(crate) fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(&self.0) else {
            return false;
        };
        mac.update(message);
        mac.verify_slice(signature).is_ok()
    }
}

impl std::fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HmacKey(..)")
    }
}

/// The active signing key plus the set of keys still accepted for
/// verification, so a key rotation has an overlap window.
/// Verification tries the current key first, then falls back through
/// retained old keys.
#[derive(Debug, Clone)]
pub struct KeyRing {
    signing_key: HmacKey,
    verification_keys: Vec<HmacKey>,
}

impl KeyRing {
    /// Build a ring with a single key used for both signing and
    /// verification — the steady-state, pre-rotation case.
    #[must_use]
    pub fn single(key: HmacKey) -> Self {
        Self {
            verification_keys: vec![key.clone()],
            signing_key: key,
        }
    }

    pub(crate) fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message)
    }

    pub(crate) fn verify_any(&self, message: &[u8], signature: &[u8]) -> bool {
        self.verification_keys
            .iter()
            .any(|key| key.verify(message, signature))
    }

    /// Rotate in a new signing key, retaining the old signing key as a
    /// verifier so tokens it already signed keep validating until they
    /// expire.
    pub fn rotate_in(&mut self, new_signing_key: HmacKey) {
        self.verification_keys.push(new_signing_key.clone());
        self.signing_key = new_signing_key;
    }

    /// Drop a verification key once no outstanding token could still carry
    /// its signature (operator-driven; the ring itself has no notion of
    /// token lifetime).
    pub fn retire(&mut self, key: &HmacKey) {
        self.verification_keys.retain(|k| k.0 != key.0);
    }
}
