//! Mint request lifecycle.
//!
//! A request is the bridge's promise to get one credential token minted
//! for one approved fingerprint. The state machine is small and strict;
//! the ledger refuses any transition not listed here, and terminal states
//! never leave.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::TxHandle;
use crate::identity::IdentityFingerprint;
use crate::store::ContentId;

/// Lifecycle state of a mint request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintState {
    /// Staged, waiting for a worker.
    Pending,
    /// Broadcast to the chain; a handle is being polled.
    Submitted,
    /// Buried under enough blocks, or the registry already held a token.
    Confirmed,
    /// Failed for a reason worth retrying; a backoff timer is running.
    FailedRetryable,
    /// Failed for good. Only an operator resubmit starts over.
    FailedTerminal,
}

impl MintState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MintState::Confirmed | MintState::FailedTerminal)
    }

    /// The full legal transition set. Everything else is a bug upstream
    /// and the ledger rejects it.
    ///
    /// `Submitted -> Pending` exists solely for crash recovery of a request
    /// that lost its handle; `Pending -> Confirmed` covers a broadcast-time
    /// revert that says the identity is already verified.
    pub fn can_transition_to(&self, next: MintState) -> bool {
        use MintState::*;
        matches!(
            (*self, next),
            (Pending, Submitted)
                | (Pending, Confirmed)
                | (Pending, FailedRetryable)
                | (Pending, FailedTerminal)
                | (Submitted, Confirmed)
                | (Submitted, FailedRetryable)
                | (Submitted, FailedTerminal)
                | (Submitted, Pending)
                | (FailedRetryable, Pending)
                | (FailedRetryable, FailedTerminal)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MintState::Pending => "pending",
            MintState::Submitted => "submitted",
            MintState::Confirmed => "confirmed",
            MintState::FailedRetryable => "failed_retryable",
            MintState::FailedTerminal => "failed_terminal",
        }
    }
}

impl fmt::Display for MintState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MintState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MintState::Pending),
            "submitted" => Ok(MintState::Submitted),
            "confirmed" => Ok(MintState::Confirmed),
            "failed_retryable" => Ok(MintState::FailedRetryable),
            "failed_terminal" => Ok(MintState::FailedTerminal),
            other => Err(format!("unknown mint state: {other}")),
        }
    }
}

/// One submission attempt, kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub nonce: Option<u64>,
    pub tx_handle: Option<TxHandle>,
    pub outcome: String,
    pub at: DateTime<Utc>,
}

/// A request to mint one credential token for an approved identity.
///
/// `version` is the CAS token: every persisted mutation bumps it, and the
/// ledger refuses to overwrite a request that changed since it was read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintRequest {
    pub id: Uuid,
    pub fingerprint: IdentityFingerprint,
    pub state: MintState,
    /// Set by the pipeline once credential metadata is pinned, before the
    /// first broadcast.
    pub metadata_content_id: Option<ContentId>,
    /// Handle of the most recent broadcast, if any.
    pub tx_handle: Option<TxHandle>,
    /// Submission attempts consumed so far.
    pub attempt_count: u32,
    pub last_error: Option<String>,
    /// Operator asked for cancellation. Before broadcast this becomes a
    /// terminal failure; after broadcast it only forbids further retries.
    pub cancel_requested: bool,
    /// When a retryable failure becomes due for another attempt.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub attempts: Vec<AttemptRecord>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MintRequest {
    pub fn new(fingerprint: IdentityFingerprint) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            fingerprint,
            state: MintState::Pending,
            metadata_content_id: None,
            tx_handle: None,
            attempt_count: 0,
            last_error: None,
            cancel_requested: false,
            next_attempt_at: None,
            attempts: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Appends an attempt to the audit trail and bumps the counter.
    pub fn record_attempt(
        &mut self,
        nonce: Option<u64>,
        tx_handle: Option<TxHandle>,
        outcome: impl Into<String>,
    ) {
        self.attempt_count += 1;
        self.attempts.push(AttemptRecord {
            attempt: self.attempt_count,
            nonce,
            tx_handle,
            outcome: outcome.into(),
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [MintState; 5] = [
        MintState::Pending,
        MintState::Submitted,
        MintState::Confirmed,
        MintState::FailedRetryable,
        MintState::FailedTerminal,
    ];

    #[test]
    fn transition_matrix_is_exact() {
        use MintState::*;
        let legal = [
            (Pending, Submitted),
            (Pending, Confirmed),
            (Pending, FailedRetryable),
            (Pending, FailedTerminal),
            (Submitted, Confirmed),
            (Submitted, FailedRetryable),
            (Submitted, FailedTerminal),
            (Submitted, Pending),
            (FailedRetryable, Pending),
            (FailedRetryable, FailedTerminal),
        ];
        for from in ALL {
            for to in ALL {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for from in [MintState::Confirmed, MintState::FailedTerminal] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn state_parses_its_own_rendering() {
        for state in ALL {
            assert_eq!(state.as_str().parse::<MintState>().expect("parse"), state);
        }
        assert!("minted".parse::<MintState>().is_err());
    }

    #[test]
    fn new_requests_start_pending_at_version_zero() {
        let request = MintRequest::new(IdentityFingerprint::from_bytes([1u8; 32]));
        assert_eq!(request.state, MintState::Pending);
        assert_eq!(request.version, 0);
        assert_eq!(request.attempt_count, 0);
        assert!(!request.is_terminal());
        assert!(request.attempts.is_empty());
        assert!(!request.cancel_requested);
    }

    #[test]
    fn record_attempt_numbers_sequentially() {
        let mut request = MintRequest::new(IdentityFingerprint::from_bytes([1u8; 32]));
        request.record_attempt(Some(0), Some(TxHandle::new("0xaa")), "broadcast accepted");
        request.record_attempt(Some(1), None, "retryable: timeout");
        assert_eq!(request.attempt_count, 2);
        assert_eq!(request.attempts[0].attempt, 1);
        assert_eq!(request.attempts[1].attempt, 2);
        assert_eq!(request.attempts[1].nonce, Some(1));
    }

    #[test]
    fn bincode_round_trip_preserves_everything() {
        let mut request = MintRequest::new(IdentityFingerprint::from_bytes([4u8; 32]));
        request.metadata_content_id = Some(ContentId::for_bytes(b"metadata"));
        request.record_attempt(Some(7), Some(TxHandle::new("0xaa")), "broadcast accepted");
        let bytes = bincode::serialize(&request).expect("serialize");
        let back: MintRequest = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(request, back);
    }
}
