//! Authentication audit events.
//!
//! Not a first-class persisted entity — logged via `tracing` as structured
//! fields rather than a hand-formatted string.

use chrono::{DateTime, Utc};

/// Masks a clientId for logs: first 4 and last 2 characters visible, the
/// rest replaced with `*`.
#[must_use]
pub fn mask_client_id(client_id: &str) -> String {
    let chars: Vec<char> = client_id.chars().collect();
    let len = chars.len();
    if len <= 6 {
        return "*".repeat(len);
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[len - 2..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(len - 6))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    Failure,
}

/// One authentication attempt, for structured logging only.
#[derive(Debug, Clone)]
pub struct AuthAuditEvent {
    pub timestamp: DateTime<Utc>,
    pub client_id_masked: String,
    pub outcome: AuthOutcome,
    pub matched_version_id: Option<String>,
    pub source_addr: Option<String>,
    pub request_id: String,
    pub degraded: bool,
}

impl AuthAuditEvent {
    pub fn emit(&self) {
        match self.outcome {
            AuthOutcome::Success => tracing::info!(
                client_id = %self.client_id_masked,
                matched_version_id = ?self.matched_version_id,
                source_addr = ?self.source_addr,
                request_id = %self.request_id,
                degraded = self.degraded,
                "authentication succeeded"
            ),
            AuthOutcome::Failure => tracing::warn!(
                client_id = %self.client_id_masked,
                source_addr = ?self.source_addr,
                request_id = %self.request_id,
                degraded = self.degraded,
                "authentication failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_middle_of_long_client_id() {
        assert_eq!(mask_client_id("vendor_xyz_12345"), "vend**********45");
    }

    #[test]
    fn fully_masks_short_client_id() {
        assert_eq!(mask_client_id("ab"), "**");
        assert_eq!(mask_client_id("abcdef"), "******");
    }
}
