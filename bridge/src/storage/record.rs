//! Verification decisions as the ledger stores them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::IdentityFingerprint;
use crate::store::ContentId;

/// Outcome of one identity verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approved)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Approved => f.write_str("approved"),
            Decision::Rejected => f.write_str("rejected"),
        }
    }
}

/// One verification decision, exactly as recorded.
///
/// The evidence blob itself lives in the content store; the record only
/// carries its address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: Uuid,
    pub fingerprint: IdentityFingerprint,
    pub decision: Decision,
    pub evidence_content_id: ContentId,
    pub recorded_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn new(
        fingerprint: IdentityFingerprint,
        decision: Decision,
        evidence_content_id: ContentId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            fingerprint,
            decision,
            evidence_content_id,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_records_carry_fresh_ids() {
        let fp = IdentityFingerprint::from_bytes([1u8; 32]);
        let cid = ContentId::for_bytes(b"evidence");
        let a = VerificationRecord::new(fp, Decision::Approved, cid);
        let b = VerificationRecord::new(fp, Decision::Approved, cid);
        assert_ne!(a.id, b.id);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn decision_renders_lowercase() {
        assert_eq!(Decision::Approved.to_string(), "approved");
        assert_eq!(Decision::Rejected.to_string(), "rejected");
        assert!(Decision::Approved.is_approved());
        assert!(!Decision::Rejected.is_approved());
    }

    #[test]
    fn json_uses_address_and_hex_forms() {
        let record = VerificationRecord::new(
            IdentityFingerprint::from_bytes([2u8; 32]),
            Decision::Rejected,
            ContentId::for_bytes(b"evidence"),
        );
        let json = serde_json::to_value(&record).expect("json");
        assert!(json["fingerprint"]
            .as_str()
            .expect("string fingerprint")
            .starts_with("pear1"));
        assert_eq!(json["decision"], "rejected");
    }

    #[test]
    fn bincode_round_trip() {
        let record = VerificationRecord::new(
            IdentityFingerprint::from_bytes([3u8; 32]),
            Decision::Approved,
            ContentId::for_bytes(b"evidence"),
        );
        let bytes = bincode::serialize(&record).expect("serialize");
        let back: VerificationRecord = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(record, back);
    }
}
