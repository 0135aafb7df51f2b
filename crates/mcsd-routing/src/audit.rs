//! Audit trail for notification delivery. The patient BSN is never logged
//! or stored raw — every record carries its HMAC-SHA256 digest instead.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// One decision point in sending a notification: an attempt, or its result.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub group_id: String,
    pub stage: AuditStage,
    pub receiver_ura: String,
    pub notification_base_url: String,
    pub endpoint_id: Option<String>,
    pub hashed_bsn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditStage {
    Attempt,
    Success,
    Failure(String),
}

/// Hashes a BSN with a runtime secret so the digest is useless without it,
/// while still letting the same BSN correlate across audit records.
#[must_use]
pub fn hash_bsn(bsn: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any size");
    mac.update(bsn.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Discards audit records; used where a caller genuinely has no sink
/// (tests, or a sender not yet wired to persistent audit storage).
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _record: AuditRecord) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bsn_and_secret_hash_identically() {
        assert_eq!(hash_bsn("123456782", "secret"), hash_bsn("123456782", "secret"));
    }

    #[test]
    fn different_secrets_hash_differently() {
        assert_ne!(hash_bsn("123456782", "secret-a"), hash_bsn("123456782", "secret-b"));
    }

    #[test]
    fn hash_never_contains_the_raw_bsn() {
        let hashed = hash_bsn("123456782", "secret");
        assert!(!hashed.contains("123456782"));
    }
}
