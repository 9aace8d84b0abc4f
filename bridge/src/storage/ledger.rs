//! # Verification Ledger
//!
//! The policy layer over [`BridgeDb`]. Everything the bridge promises about
//! durability and uniqueness is enforced in this file:
//!
//! - at most one APPROVED record per fingerprint, decided by CAS, so
//!   concurrent duplicates lose atomically instead of racing;
//! - at most one active mint request per fingerprint, in a CAS-guarded
//!   slot keyed by the fingerprint itself;
//! - every mint mutation goes through [`transition`](VerificationLedger::transition),
//!   which checks the state machine and refuses stale writes;
//! - terminal requests move to an append-only archive, freeing the slot
//!   for operator resubmission;
//! - the account nonce counter persists here too, so restarts never reuse
//!   a nonce.
//!
//! Reads are cheap; writes flush. A decision that is not on disk did not
//! happen.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Db;
use thiserror::Error;
use tracing::debug;

use super::db::{BridgeDb, DbError, DbResult, META_NONCE_COUNTER};
use super::mint::{MintRequest, MintState};
use super::record::{Decision, VerificationRecord};
use crate::identity::IdentityFingerprint;
use crate::store::ContentId;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("an approved verification already exists for {fingerprint}")]
    DuplicateApproval { fingerprint: IdentityFingerprint },

    #[error("no approved verification exists for {fingerprint}")]
    ApprovalMissing { fingerprint: IdentityFingerprint },

    #[error("a confirmed mint already exists for {fingerprint}")]
    AlreadyConfirmed { fingerprint: IdentityFingerprint },

    #[error("mint request for {fingerprint} changed since it was read")]
    VersionConflict { fingerprint: IdentityFingerprint },

    #[error("no active mint request for {fingerprint}")]
    NotFound { fingerprint: IdentityFingerprint },

    #[error("illegal mint state transition: {from} -> {to}")]
    InvalidTransition { from: MintState, to: MintState },

    #[error("mint request is {state}, not terminal")]
    NotTerminal { state: MintState },

    #[error(transparent)]
    Db(#[from] DbError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Result of staging a mint request.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// A fresh PENDING request now occupies the active slot.
    Created(MintRequest),
    /// The slot was already occupied; this is what lives there.
    Existing(MintRequest),
}

impl StageOutcome {
    pub fn request(&self) -> &MintRequest {
        match self {
            StageOutcome::Created(r) | StageOutcome::Existing(r) => r,
        }
    }

    pub fn into_request(self) -> MintRequest {
        match self {
            StageOutcome::Created(r) | StageOutcome::Existing(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, StageOutcome::Created(_))
    }
}

/// Tree sizes, for status endpoints and operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub approvals: usize,
    pub rejections: usize,
    pub active_requests: usize,
    pub archived_requests: usize,
}

/// Durable record of verification decisions and mint lifecycle.
pub struct VerificationLedger {
    db: BridgeDb,
}

impl VerificationLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Ok(Self {
            db: BridgeDb::open(path)?,
        })
    }

    pub fn open_temporary() -> DbResult<Self> {
        Ok(Self {
            db: BridgeDb::open_temporary()?,
        })
    }

    pub fn from_db(db: Db) -> DbResult<Self> {
        Ok(Self {
            db: BridgeDb::from_db(db)?,
        })
    }

    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()
    }

    // -----------------------------------------------------------------------
    // Verification decisions
    // -----------------------------------------------------------------------

    /// Records one verification decision.
    ///
    /// Approvals are unique per fingerprint: the insert is a CAS against an
    /// empty slot, and a loser gets [`LedgerError::DuplicateApproval`] no
    /// matter how closely the calls raced. Rejections append without limit.
    pub fn record_verification(
        &self,
        fingerprint: IdentityFingerprint,
        decision: Decision,
        evidence_content_id: ContentId,
    ) -> LedgerResult<VerificationRecord> {
        let record = VerificationRecord::new(fingerprint, decision, evidence_content_id);
        match decision {
            Decision::Approved => {
                let bytes = BridgeDb::encode(&record)?;
                let outcome = self
                    .db
                    .approvals
                    .compare_and_swap(fingerprint.as_bytes(), None::<&[u8]>, Some(bytes))
                    .map_err(DbError::from)?;
                if outcome.is_err() {
                    return Err(LedgerError::DuplicateApproval { fingerprint });
                }
            }
            Decision::Rejected => {
                let seq = self.db.next_seq()?;
                let key = BridgeDb::suffixed_key(&fingerprint, seq);
                self.db
                    .rejections
                    .insert(key, BridgeDb::encode(&record)?)
                    .map_err(DbError::from)?;
            }
        }
        self.db.flush()?;
        debug!(fingerprint = %fingerprint, decision = %decision, "verification recorded");
        Ok(record)
    }

    /// The unique APPROVED record for a fingerprint, if any.
    pub fn approved_record(
        &self,
        fingerprint: &IdentityFingerprint,
    ) -> LedgerResult<Option<VerificationRecord>> {
        match self
            .db
            .approvals
            .get(fingerprint.as_bytes())
            .map_err(DbError::from)?
        {
            Some(bytes) => Ok(Some(BridgeDb::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every decision ever recorded for a fingerprint, oldest first.
    pub fn verification_history(
        &self,
        fingerprint: &IdentityFingerprint,
    ) -> LedgerResult<Vec<VerificationRecord>> {
        let mut records = Vec::new();
        for entry in self.db.rejections.scan_prefix(fingerprint.as_bytes()) {
            let (_key, value) = entry.map_err(DbError::from)?;
            records.push(BridgeDb::decode::<VerificationRecord>(&value)?);
        }
        if let Some(approval) = self.approved_record(fingerprint)? {
            records.push(approval);
        }
        records.sort_by_key(|r| r.recorded_at);
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Mint lifecycle
    // -----------------------------------------------------------------------

    /// Stages a mint request for an approved fingerprint.
    ///
    /// Refuses when no approval exists or a confirmed mint already does.
    /// If the active slot is occupied this is a no-op that hands back the
    /// occupant, so staging is idempotent.
    pub fn create_mint_request(
        &self,
        fingerprint: IdentityFingerprint,
    ) -> LedgerResult<StageOutcome> {
        if self.approved_record(&fingerprint)?.is_none() {
            return Err(LedgerError::ApprovalMissing { fingerprint });
        }
        if self.confirmed_exists(&fingerprint)? {
            return Err(LedgerError::AlreadyConfirmed { fingerprint });
        }
        loop {
            let request = MintRequest::new(fingerprint);
            let bytes = BridgeDb::encode(&request)?;
            let outcome = self
                .db
                .mints
                .compare_and_swap(fingerprint.as_bytes(), None::<&[u8]>, Some(bytes))
                .map_err(DbError::from)?;
            if outcome.is_ok() {
                self.db.flush()?;
                debug!(fingerprint = %fingerprint, "mint request staged");
                return Ok(StageOutcome::Created(request));
            }
            // Slot occupied. The re-read can race a concurrent archive,
            // hence the loop instead of an unwrap.
            if let Some(existing) = self.get_mint_state(&fingerprint)? {
                return Ok(StageOutcome::Existing(existing));
            }
        }
    }

    /// The active mint request for a fingerprint, if any.
    pub fn get_mint_state(
        &self,
        fingerprint: &IdentityFingerprint,
    ) -> LedgerResult<Option<MintRequest>> {
        match self
            .db
            .mints
            .get(fingerprint.as_bytes())
            .map_err(DbError::from)?
        {
            Some(bytes) => Ok(Some(BridgeDb::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Applies a mutation to a mint request, guarded two ways.
    ///
    /// The state machine check rejects illegal transitions outright, and
    /// the write is a CAS against the exact bytes of `view`: if anyone
    /// wrote the request since the caller read it, this fails with
    /// [`LedgerError::VersionConflict`] and nothing is written. On success
    /// the stored request has its version bumped and `updated_at`
    /// refreshed, and the new value is returned.
    pub fn transition<F>(&self, view: &MintRequest, mutate: F) -> LedgerResult<MintRequest>
    where
        F: FnOnce(&mut MintRequest),
    {
        let fingerprint = view.fingerprint;
        let old_bytes = BridgeDb::encode(view)?;

        let mut next = view.clone();
        mutate(&mut next);
        if next.state != view.state && !view.state.can_transition_to(next.state) {
            return Err(LedgerError::InvalidTransition {
                from: view.state,
                to: next.state,
            });
        }
        next.version = view.version + 1;
        next.updated_at = Utc::now();

        let new_bytes = BridgeDb::encode(&next)?;
        let outcome = self
            .db
            .mints
            .compare_and_swap(fingerprint.as_bytes(), Some(old_bytes), Some(new_bytes))
            .map_err(DbError::from)?;
        if outcome.is_err() {
            return Err(LedgerError::VersionConflict { fingerprint });
        }
        self.db.flush()?;
        Ok(next)
    }

    /// Moves a terminal request out of the active slot into the archive.
    ///
    /// A crash between the archive insert and the slot clear leaves a
    /// terminal copy in both places; the recovery sweep re-archives it and
    /// readers dedupe by request id, so the window is harmless.
    pub fn archive_request(
        &self,
        fingerprint: &IdentityFingerprint,
    ) -> LedgerResult<MintRequest> {
        let request = self
            .get_mint_state(fingerprint)?
            .ok_or(LedgerError::NotFound {
                fingerprint: *fingerprint,
            })?;
        if !request.state.is_terminal() {
            return Err(LedgerError::NotTerminal {
                state: request.state,
            });
        }

        let seq = self.db.next_seq()?;
        let key = BridgeDb::suffixed_key(fingerprint, seq);
        self.db
            .mint_archive
            .insert(key, BridgeDb::encode(&request)?)
            .map_err(DbError::from)?;

        let old_bytes = BridgeDb::encode(&request)?;
        let cleared = self
            .db
            .mints
            .compare_and_swap(fingerprint.as_bytes(), Some(old_bytes), None::<Vec<u8>>)
            .map_err(DbError::from)?;
        if cleared.is_err() {
            return Err(LedgerError::VersionConflict {
                fingerprint: *fingerprint,
            });
        }
        self.db.flush()?;
        debug!(fingerprint = %fingerprint, state = %request.state, "mint request archived");
        Ok(request)
    }

    // -----------------------------------------------------------------------
    // Scans
    // -----------------------------------------------------------------------

    /// Every request currently in the active slot, any state.
    pub fn active_requests(&self) -> LedgerResult<Vec<MintRequest>> {
        let mut out = Vec::new();
        for entry in self.db.mints.iter() {
            let (_key, value) = entry.map_err(DbError::from)?;
            out.push(BridgeDb::decode::<MintRequest>(&value)?);
        }
        Ok(out)
    }

    /// Approved fingerprints with no active request and no confirmed mint.
    /// These are the ones a recovery sweep must stage.
    pub fn unbridged_approvals(&self) -> LedgerResult<Vec<IdentityFingerprint>> {
        let mut out = Vec::new();
        for entry in self.db.approvals.iter() {
            let (key, _value) = entry.map_err(DbError::from)?;
            let fingerprint = BridgeDb::fingerprint_from_key("approvals", &key)?;
            if self.get_mint_state(&fingerprint)?.is_some() {
                continue;
            }
            if self.archived_confirm_exists(&fingerprint)? {
                continue;
            }
            out.push(fingerprint);
        }
        Ok(out)
    }

    /// Every FAILED_TERMINAL request, active or archived, deduped by id.
    /// This is the operator's worklist.
    pub fn terminal_failures(&self) -> LedgerResult<Vec<MintRequest>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for request in self.active_requests()? {
            if request.state == MintState::FailedTerminal && seen.insert(request.id) {
                out.push(request);
            }
        }
        for entry in self.db.mint_archive.iter() {
            let (_key, value) = entry.map_err(DbError::from)?;
            let request: MintRequest = BridgeDb::decode(&value)?;
            if request.state == MintState::FailedTerminal && seen.insert(request.id) {
                out.push(request);
            }
        }
        Ok(out)
    }

    /// True when a CONFIRMED request exists for the fingerprint, in the
    /// active slot or the archive.
    pub fn confirmed_exists(&self, fingerprint: &IdentityFingerprint) -> LedgerResult<bool> {
        if let Some(active) = self.get_mint_state(fingerprint)? {
            if active.state == MintState::Confirmed {
                return Ok(true);
            }
        }
        self.archived_confirm_exists(fingerprint)
    }

    fn archived_confirm_exists(
        &self,
        fingerprint: &IdentityFingerprint,
    ) -> LedgerResult<bool> {
        for entry in self.db.mint_archive.scan_prefix(fingerprint.as_bytes()) {
            let (_key, value) = entry.map_err(DbError::from)?;
            let request: MintRequest = BridgeDb::decode(&value)?;
            if request.state == MintState::Confirmed {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            approvals: self.db.approvals.len(),
            rejections: self.db.rejections.len(),
            active_requests: self.db.mints.len(),
            archived_requests: self.db.mint_archive.len(),
        }
    }

    // -----------------------------------------------------------------------
    // Nonce counter
    // -----------------------------------------------------------------------

    /// Allocates the next account nonce and persists the counter before
    /// returning, so a crash after allocation can only skip a nonce, never
    /// reuse one. Callers serialize through `NonceAllocator`; this method
    /// itself does not lock.
    pub fn next_nonce(&self) -> DbResult<u64> {
        let current = match self.db.meta.get(META_NONCE_COUNTER)? {
            Some(bytes) => decode_u64(&bytes)?,
            None => 0,
        };
        self.db
            .meta
            .insert(META_NONCE_COUNTER, (current + 1).to_be_bytes().to_vec())?;
        self.db.flush()?;
        Ok(current)
    }
}

fn decode_u64(bytes: &[u8]) -> DbResult<u64> {
    let array: [u8; 8] = bytes.try_into().map_err(|_| {
        DbError::Serialization(format!("expected 8-byte counter, got {} bytes", bytes.len()))
    })?;
    Ok(u64::from_be_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TxHandle;

    fn fp(tag: u8) -> IdentityFingerprint {
        IdentityFingerprint::from_bytes([tag; 32])
    }

    fn cid(tag: u8) -> ContentId {
        ContentId::from_bytes([tag; 32])
    }

    fn ledger() -> VerificationLedger {
        VerificationLedger::open_temporary().expect("temp ledger")
    }

    fn approve(ledger: &VerificationLedger, tag: u8) -> VerificationRecord {
        ledger
            .record_verification(fp(tag), Decision::Approved, cid(tag))
            .expect("approve")
    }

    // -----------------------------------------------------------------------
    // 1. Verification decisions
    // -----------------------------------------------------------------------

    #[test]
    fn approval_is_recorded_and_fetchable() {
        let ledger = ledger();
        let record = approve(&ledger, 1);
        let fetched = ledger.approved_record(&fp(1)).expect("read").expect("present");
        assert_eq!(fetched, record);
        assert!(ledger.approved_record(&fp(2)).expect("read").is_none());
    }

    #[test]
    fn duplicate_approval_is_rejected() {
        let ledger = ledger();
        approve(&ledger, 1);
        let second = ledger.record_verification(fp(1), Decision::Approved, cid(9));
        assert!(matches!(
            second,
            Err(LedgerError::DuplicateApproval { fingerprint }) if fingerprint == fp(1)
        ));
        // The original record is untouched.
        let kept = ledger.approved_record(&fp(1)).expect("read").expect("present");
        assert_eq!(kept.evidence_content_id, cid(1));
    }

    #[test]
    fn rejections_accumulate_without_limit() {
        let ledger = ledger();
        for _ in 0..3 {
            ledger
                .record_verification(fp(1), Decision::Rejected, cid(1))
                .expect("reject");
        }
        approve(&ledger, 1);

        let history = ledger.verification_history(&fp(1)).expect("history");
        assert_eq!(history.len(), 4);
        let rejected = history.iter().filter(|r| r.decision == Decision::Rejected).count();
        assert_eq!(rejected, 3);
        // Chronological: the approval came last.
        assert_eq!(history.last().expect("nonempty").decision, Decision::Approved);
    }

    #[test]
    fn history_of_unknown_fingerprint_is_empty() {
        let ledger = ledger();
        assert!(ledger.verification_history(&fp(42)).expect("history").is_empty());
    }

    // -----------------------------------------------------------------------
    // 2. Mint staging
    // -----------------------------------------------------------------------

    #[test]
    fn staging_requires_an_approval() {
        let ledger = ledger();
        assert!(matches!(
            ledger.create_mint_request(fp(1)),
            Err(LedgerError::ApprovalMissing { .. })
        ));
    }

    #[test]
    fn staging_creates_a_pending_request() {
        let ledger = ledger();
        approve(&ledger, 1);
        let outcome = ledger.create_mint_request(fp(1)).expect("stage");
        assert!(outcome.is_created());
        let request = outcome.into_request();
        assert_eq!(request.state, MintState::Pending);
        assert_eq!(request.version, 0);
    }

    #[test]
    fn staging_is_idempotent() {
        let ledger = ledger();
        approve(&ledger, 1);
        let first = ledger.create_mint_request(fp(1)).expect("stage").into_request();
        let second = ledger.create_mint_request(fp(1)).expect("stage");
        assert!(!second.is_created());
        assert_eq!(second.request().id, first.id);
    }

    #[test]
    fn staging_refused_after_archived_confirmation() {
        let ledger = ledger();
        approve(&ledger, 1);
        let request = ledger.create_mint_request(fp(1)).expect("stage").into_request();
        ledger
            .transition(&request, |r| r.state = MintState::Confirmed)
            .expect("confirm");
        ledger.archive_request(&fp(1)).expect("archive");

        assert!(matches!(
            ledger.create_mint_request(fp(1)),
            Err(LedgerError::AlreadyConfirmed { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // 3. Transitions
    // -----------------------------------------------------------------------

    #[test]
    fn legal_transition_bumps_version_and_persists() {
        let ledger = ledger();
        approve(&ledger, 1);
        let request = ledger.create_mint_request(fp(1)).expect("stage").into_request();

        let updated = ledger
            .transition(&request, |r| {
                r.state = MintState::Submitted;
                r.tx_handle = Some(TxHandle::new("0xaa"));
                r.record_attempt(Some(0), Some(TxHandle::new("0xaa")), "broadcast accepted");
            })
            .expect("transition");

        assert_eq!(updated.version, 1);
        assert_eq!(updated.state, MintState::Submitted);

        let stored = ledger.get_mint_state(&fp(1)).expect("read").expect("present");
        assert_eq!(stored, updated);
        assert_eq!(stored.attempts.len(), 1);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let ledger = ledger();
        approve(&ledger, 1);
        let request = ledger.create_mint_request(fp(1)).expect("stage").into_request();
        let confirmed = ledger
            .transition(&request, |r| r.state = MintState::Confirmed)
            .expect("confirm");

        let escape = ledger.transition(&confirmed, |r| r.state = MintState::Pending);
        assert!(matches!(
            escape,
            Err(LedgerError::InvalidTransition {
                from: MintState::Confirmed,
                to: MintState::Pending,
            })
        ));
    }

    #[test]
    fn stale_view_conflicts() {
        let ledger = ledger();
        approve(&ledger, 1);
        let request = ledger.create_mint_request(fp(1)).expect("stage").into_request();

        ledger
            .transition(&request, |r| r.state = MintState::Submitted)
            .expect("first write");

        // Same view again: the slot moved on, so this must lose.
        let stale = ledger.transition(&request, |r| r.state = MintState::FailedRetryable);
        assert!(matches!(stale, Err(LedgerError::VersionConflict { .. })));
    }

    // -----------------------------------------------------------------------
    // 4. Archive
    // -----------------------------------------------------------------------

    #[test]
    fn archive_requires_a_terminal_state() {
        let ledger = ledger();
        approve(&ledger, 1);
        ledger.create_mint_request(fp(1)).expect("stage");
        assert!(matches!(
            ledger.archive_request(&fp(1)),
            Err(LedgerError::NotTerminal { state: MintState::Pending })
        ));
    }

    #[test]
    fn archive_clears_the_active_slot() {
        let ledger = ledger();
        approve(&ledger, 1);
        let request = ledger.create_mint_request(fp(1)).expect("stage").into_request();
        ledger
            .transition(&request, |r| {
                r.state = MintState::FailedTerminal;
                r.last_error = Some("registry paused".into());
            })
            .expect("fail");

        let archived = ledger.archive_request(&fp(1)).expect("archive");
        assert_eq!(archived.state, MintState::FailedTerminal);
        assert!(ledger.get_mint_state(&fp(1)).expect("read").is_none());
        assert_eq!(ledger.stats().archived_requests, 1);

        // The slot is free for a fresh attempt.
        let fresh = ledger.create_mint_request(fp(1)).expect("restage");
        assert!(fresh.is_created());
        assert_ne!(fresh.request().id, archived.id);
    }

    #[test]
    fn archive_of_missing_request_is_not_found() {
        let ledger = ledger();
        assert!(matches!(
            ledger.archive_request(&fp(1)),
            Err(LedgerError::NotFound { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // 5. Scans
    // -----------------------------------------------------------------------

    #[test]
    fn unbridged_lists_approvals_without_requests() {
        let ledger = ledger();
        approve(&ledger, 1);
        approve(&ledger, 2);
        ledger.create_mint_request(fp(1)).expect("stage");

        let unbridged = ledger.unbridged_approvals().expect("scan");
        assert_eq!(unbridged, vec![fp(2)]);
    }

    #[test]
    fn unbridged_skips_archived_confirmations() {
        let ledger = ledger();
        approve(&ledger, 1);
        let request = ledger.create_mint_request(fp(1)).expect("stage").into_request();
        ledger
            .transition(&request, |r| r.state = MintState::Confirmed)
            .expect("confirm");
        ledger.archive_request(&fp(1)).expect("archive");

        assert!(ledger.unbridged_approvals().expect("scan").is_empty());
    }

    #[test]
    fn terminal_failures_cover_active_and_archived() {
        let ledger = ledger();
        approve(&ledger, 1);

        // First attempt fails terminally and is archived.
        let first = ledger.create_mint_request(fp(1)).expect("stage").into_request();
        ledger
            .transition(&first, |r| r.state = MintState::FailedTerminal)
            .expect("fail");
        ledger.archive_request(&fp(1)).expect("archive");

        // Second attempt fails terminally and stays active.
        let second = ledger.create_mint_request(fp(1)).expect("restage").into_request();
        ledger
            .transition(&second, |r| r.state = MintState::FailedTerminal)
            .expect("fail");

        let failures = ledger.terminal_failures().expect("scan");
        assert_eq!(failures.len(), 2);
        let ids: HashSet<_> = failures.iter().map(|r| r.id).collect();
        assert!(ids.contains(&first.id));
        assert!(ids.contains(&second.id));
    }

    #[test]
    fn stats_reflect_tree_sizes() {
        let ledger = ledger();
        approve(&ledger, 1);
        ledger
            .record_verification(fp(2), Decision::Rejected, cid(2))
            .expect("reject");
        ledger.create_mint_request(fp(1)).expect("stage");

        let stats = ledger.stats();
        assert_eq!(stats.approvals, 1);
        assert_eq!(stats.rejections, 1);
        assert_eq!(stats.active_requests, 1);
        assert_eq!(stats.archived_requests, 0);
    }

    // -----------------------------------------------------------------------
    // 6. Nonce counter
    // -----------------------------------------------------------------------

    #[test]
    fn nonces_start_at_zero_and_increase() {
        let ledger = ledger();
        assert_eq!(ledger.next_nonce().expect("nonce"), 0);
        assert_eq!(ledger.next_nonce().expect("nonce"), 1);
        assert_eq!(ledger.next_nonce().expect("nonce"), 2);
    }

    // -----------------------------------------------------------------------
    // 7. Persistence across reopen
    // -----------------------------------------------------------------------

    #[test]
    fn ledger_state_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger");

        {
            let ledger = VerificationLedger::open(&path).expect("open");
            approve(&ledger, 1);
            let request = ledger.create_mint_request(fp(1)).expect("stage").into_request();
            ledger
                .transition(&request, |r| {
                    r.state = MintState::Submitted;
                    r.tx_handle = Some(TxHandle::new("0xaa"));
                })
                .expect("submit");
            assert_eq!(ledger.next_nonce().expect("nonce"), 0);
            assert_eq!(ledger.next_nonce().expect("nonce"), 1);
        }

        let reopened = VerificationLedger::open(&path).expect("reopen");

        // Uniqueness still holds.
        assert!(matches!(
            reopened.record_verification(fp(1), Decision::Approved, cid(1)),
            Err(LedgerError::DuplicateApproval { .. })
        ));

        // The in-flight request is intact, handle and all.
        let request = reopened.get_mint_state(&fp(1)).expect("read").expect("present");
        assert_eq!(request.state, MintState::Submitted);
        assert_eq!(request.tx_handle, Some(TxHandle::new("0xaa")));

        // The nonce counter continues instead of restarting.
        assert_eq!(reopened.next_nonce().expect("nonce"), 2);
    }
}
