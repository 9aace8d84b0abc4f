//! # Mint Worker
//!
//! One worker task owns one fingerprint partition and drives every request
//! in it through the pipeline:
//!
//! 1. Load the APPROVED record and fetch its evidence blob, with a bounded
//!    retry budget for store outages.
//! 2. Build the credential metadata document, store it, and pin the
//!    resulting content id on the request.
//! 3. Sign the mint call, allocate a nonce, and broadcast it.
//! 4. Poll transaction status until the confirmation depth is reached or
//!    the confirmation deadline elapses.
//!
//! Every persisted step goes through the ledger's CAS transition, so a
//! concurrent operator action (cancel, resubmit) surfaces as a version
//! conflict here rather than a lost write. The worker reloads and carries
//! on, or gives up when the request went terminal under it.
//!
//! ## Failure classification
//!
//! - Store `NotFound`, or `Unavailable` past the budget: FAILED_TERMINAL.
//!   Evidence that cannot be fetched needs a fresh verification cycle, not
//!   a blind retry.
//! - Transient chain errors and elapsed confirmation deadlines:
//!   FAILED_RETRYABLE with jittered backoff, up to the attempt cap.
//! - Reverts naming the registry's duplicate guard: CONFIRMED. The
//!   identity is on chain, which is the outcome minting wanted.
//! - Any other revert or an invalid call: FAILED_TERMINAL.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::chain::{ChainAccount, ChainClient, ChainError, MintCall, TxHandle, TxStatus};
use crate::config::{ALREADY_VERIFIED_MARKER, METADATA_SCHEMA};
use crate::identity::IdentityFingerprint;
use crate::storage::{LedgerError, MintRequest, MintState, VerificationLedger, VerificationRecord};
use crate::store::{BlobStore, ContentId, StoreError};

use super::nonce::NonceAllocator;
use super::orchestrator::{MintEvent, MintJob, MintLoopError, OrchestratorConfig};

// ---------------------------------------------------------------------------
// Credential metadata
// ---------------------------------------------------------------------------

/// The JSON document stored alongside a minted credential token.
///
/// Everything in it is already public or content-addressed: the bech32
/// fingerprint address, the evidence pointer, and timestamps. No raw
/// identity attributes ever appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialMetadata {
    pub schema: String,
    pub fingerprint: String,
    pub evidence_content_id: String,
    pub evidence_size: usize,
    pub issued_at: DateTime<Utc>,
}

impl CredentialMetadata {
    pub fn build(approval: &VerificationRecord, evidence_size: usize) -> Self {
        Self {
            schema: METADATA_SCHEMA.to_string(),
            fingerprint: approval.fingerprint.to_address(),
            evidence_content_id: approval.evidence_content_id.to_hex(),
            evidence_size,
            issued_at: Utc::now(),
        }
    }
}

/// True when a revert reason names the registry's duplicate guard.
pub(crate) fn is_already_verified(reason: &str) -> bool {
    reason.to_lowercase().contains(ALREADY_VERIFIED_MARKER)
}

// Store failures either abort the request or abort the worker.
enum StoreAbort {
    Shutdown,
    Terminal(String),
}

// ---------------------------------------------------------------------------
// MintWorker
// ---------------------------------------------------------------------------

/// Drives mint requests for one fingerprint partition.
///
/// All requests for a given fingerprint hash to the same partition, so
/// within a fingerprint the pipeline is single-writer. Cross-fingerprint
/// work proceeds in parallel across partitions.
pub struct MintWorker {
    partition: usize,
    ledger: Arc<VerificationLedger>,
    store: Arc<dyn BlobStore>,
    chain: Arc<dyn ChainClient>,
    account: Arc<ChainAccount>,
    nonces: Arc<NonceAllocator>,
    config: Arc<OrchestratorConfig>,
    events: broadcast::Sender<MintEvent>,
    requeue: mpsc::Sender<MintJob>,
}

impl MintWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        partition: usize,
        ledger: Arc<VerificationLedger>,
        store: Arc<dyn BlobStore>,
        chain: Arc<dyn ChainClient>,
        account: Arc<ChainAccount>,
        nonces: Arc<NonceAllocator>,
        config: Arc<OrchestratorConfig>,
        events: broadcast::Sender<MintEvent>,
        requeue: mpsc::Sender<MintJob>,
    ) -> Self {
        Self {
            partition,
            ledger,
            store,
            chain,
            account,
            nonces,
            config,
            events,
            requeue,
        }
    }

    /// Consumes jobs until the shutdown signal fires.
    ///
    /// Returns `Err(MintLoopError::Shutdown)` on a clean exit, mirroring
    /// the request. A failure while processing one job is logged and the
    /// worker moves on; one poisoned fingerprint must not stall the
    /// partition.
    pub async fn run(
        self: Arc<Self>,
        mut jobs: mpsc::Receiver<MintJob>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), MintLoopError> {
        debug!(partition = self.partition, "mint worker starting");

        loop {
            if *shutdown.borrow() {
                info!(partition = self.partition, "mint worker shutting down");
                return Err(MintLoopError::Shutdown);
            }

            let job = tokio::select! {
                job = jobs.recv() => match job {
                    Some(job) => job,
                    None => return Err(MintLoopError::QueueClosed),
                },
                _ = shutdown.changed() => continue,
            };

            match self.process(job.fingerprint, &mut shutdown).await {
                Ok(()) => {}
                Err(MintLoopError::Shutdown) => {
                    info!(partition = self.partition, "mint worker shutting down");
                    return Err(MintLoopError::Shutdown);
                }
                Err(e) => {
                    warn!(
                        partition = self.partition,
                        fingerprint = %job.fingerprint,
                        error = %e,
                        "mint job failed"
                    );
                }
            }
        }
    }

    /// Dispatches one job according to the request's persisted state.
    async fn process(
        &self,
        fingerprint: IdentityFingerprint,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), MintLoopError> {
        let request = match self.ledger.get_mint_state(&fingerprint)? {
            Some(request) => request,
            None => {
                debug!(fingerprint = %fingerprint, "job for absent request, dropping");
                return Ok(());
            }
        };

        if request.state.is_terminal() {
            return Ok(());
        }

        if request.cancel_requested
            && matches!(
                request.state,
                MintState::Pending | MintState::FailedRetryable
            )
        {
            return self
                .fail_terminal(request, None, None, "cancelled by operator", false)
                .await;
        }

        match request.state {
            MintState::Pending => self.run_pipeline(request, shutdown).await,
            MintState::FailedRetryable => self.resume_retry(request, shutdown).await,
            MintState::Submitted => self.resume_submitted(request, shutdown).await,
            MintState::Confirmed | MintState::FailedTerminal => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    /// Runs the full pipeline for a PENDING request.
    async fn run_pipeline(
        &self,
        request: MintRequest,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), MintLoopError> {
        let fingerprint = request.fingerprint;

        // 1. Approval record and evidence blob.
        let approval = match self.ledger.approved_record(&fingerprint)? {
            Some(record) => record,
            None => {
                return self
                    .fail_terminal(
                        request,
                        None,
                        None,
                        "approval record missing from ledger",
                        false,
                    )
                    .await;
            }
        };

        let evidence = match self
            .fetch_with_budget(&approval.evidence_content_id, shutdown)
            .await
        {
            Ok(bytes) => bytes,
            Err(StoreAbort::Shutdown) => return Err(MintLoopError::Shutdown),
            Err(StoreAbort::Terminal(reason)) => {
                return self.fail_terminal(request, None, None, &reason, false).await;
            }
        };

        // 2. Credential metadata: build, store, pin the content id.
        let metadata = CredentialMetadata::build(&approval, evidence.len());
        let payload =
            serde_json::to_vec(&metadata).map_err(|e| MintLoopError::Encode(e.to_string()))?;
        let metadata_id = match self.put_with_budget(payload, shutdown).await {
            Ok(id) => id,
            Err(StoreAbort::Shutdown) => return Err(MintLoopError::Shutdown),
            Err(StoreAbort::Terminal(reason)) => {
                return self.fail_terminal(request, None, None, &reason, false).await;
            }
        };

        let request = match self
            .update_live(request, |r| r.metadata_content_id = Some(metadata_id))
            .await?
        {
            Some(request) => request,
            None => return Ok(()),
        };

        // A cancel may have raced the store work.
        if request.cancel_requested {
            return self
                .fail_terminal(request, None, None, "cancelled by operator", false)
                .await;
        }

        // 3. Sign, allocate a nonce, broadcast.
        let call = MintCall::new(fingerprint, metadata_id);
        let call_data = self
            .account
            .sign_call(&call)
            .map_err(|e| MintLoopError::Encode(e.to_string()))?;
        let nonce = self.nonces.allocate().await?;

        match self.chain.submit(call_data, nonce).await {
            Ok(handle) => {
                let updated = match self
                    .update_live(request, |r| {
                        r.state = MintState::Submitted;
                        r.tx_handle = Some(handle.clone());
                        r.last_error = None;
                        r.next_attempt_at = None;
                        r.record_attempt(Some(nonce), Some(handle.clone()), "broadcast accepted");
                    })
                    .await?
                {
                    Some(updated) => updated,
                    None => return Ok(()),
                };

                info!(
                    fingerprint = %fingerprint,
                    handle = %handle,
                    nonce,
                    attempt = updated.attempt_count,
                    "mint call broadcast"
                );
                self.emit(MintEvent::Submitted {
                    fingerprint,
                    tx_handle: handle.clone(),
                    attempt: updated.attempt_count,
                });

                // 4. Wait for the chain's verdict.
                self.poll_confirmation(updated, handle, shutdown).await
            }
            Err(ChainError::Transient { reason }) => {
                self.handle_retryable(
                    request,
                    Some(nonce),
                    None,
                    &format!("broadcast failed: {reason}"),
                    shutdown,
                )
                .await
            }
            Err(ChainError::Reverted { reason }) => {
                self.classify_revert(request, Some(nonce), None, &reason).await
            }
            Err(ChainError::InvalidCall { reason }) => {
                self.fail_terminal(
                    request,
                    Some(nonce),
                    None,
                    &format!("call rejected: {reason}"),
                    true,
                )
                .await
            }
        }
    }

    /// Polls transaction status until depth, revert, or deadline.
    async fn poll_confirmation(
        &self,
        request: MintRequest,
        handle: TxHandle,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), MintLoopError> {
        let fingerprint = request.fingerprint;
        let deadline = tokio::time::Instant::now() + self.config.confirmation_deadline;

        loop {
            if *shutdown.borrow() {
                return Err(MintLoopError::Shutdown);
            }
            if tokio::time::Instant::now() >= deadline {
                // Still unresolved. Treated as transient; a later attempt
                // broadcasts with a fresh nonce and the idempotency key
                // keeps the mint single.
                return self
                    .handle_retryable(
                        request,
                        None,
                        Some(handle),
                        "confirmation deadline elapsed",
                        shutdown,
                    )
                    .await;
            }

            match self.chain.get_status(&handle).await {
                Ok(TxStatus::Confirmed { depth }) if depth >= self.config.confirmation_depth => {
                    let updated = self
                        .update_live(request, |r| {
                            r.state = MintState::Confirmed;
                            r.last_error = None;
                            r.next_attempt_at = None;
                        })
                        .await?;
                    if updated.is_some() {
                        info!(
                            fingerprint = %fingerprint,
                            handle = %handle,
                            depth,
                            "mint confirmed"
                        );
                        self.emit(MintEvent::Confirmed {
                            fingerprint,
                            tx_handle: Some(handle),
                            depth,
                        });
                    }
                    return Ok(());
                }
                Ok(TxStatus::Confirmed { .. } | TxStatus::Pending | TxStatus::Unknown) => {}
                Ok(TxStatus::Reverted { reason }) => {
                    return self
                        .classify_revert(request, None, Some(handle), &reason)
                        .await;
                }
                Err(e) if e.is_transient() => {
                    debug!(fingerprint = %fingerprint, error = %e, "status poll failed, retrying");
                }
                Err(e) => {
                    return self
                        .handle_retryable(
                            request,
                            None,
                            Some(handle),
                            &format!("status poll failed: {e}"),
                            shutdown,
                        )
                        .await;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => return Err(MintLoopError::Shutdown),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Resumption
    // -----------------------------------------------------------------------

    /// A FAILED_RETRYABLE job: repark it if the backoff has not elapsed,
    /// otherwise flip to PENDING and run the pipeline again.
    async fn resume_retry(
        &self,
        request: MintRequest,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), MintLoopError> {
        if let Some(due_at) = request.next_attempt_at {
            let now = Utc::now();
            if due_at > now {
                let wait = (due_at - now).to_std().unwrap_or(Duration::ZERO);
                self.schedule_requeue(request.fingerprint, wait, shutdown.clone());
                return Ok(());
            }
        }

        let request = match self
            .update_live(request, |r| {
                r.state = MintState::Pending;
                r.next_attempt_at = None;
            })
            .await?
        {
            Some(request) => request,
            None => return Ok(()),
        };
        self.run_pipeline(request, shutdown).await
    }

    /// A SUBMITTED job, seen after a crash or re-enqueue. With a handle the
    /// broadcast already happened, so only polling resumes. Without one the
    /// crash hit before the broadcast response was durably recorded, and the
    /// request re-enters the pipeline; the idempotency key makes the second
    /// broadcast safe.
    async fn resume_submitted(
        &self,
        request: MintRequest,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), MintLoopError> {
        match request.tx_handle.clone() {
            Some(handle) => self.poll_confirmation(request, handle, shutdown).await,
            None => {
                let request = match self
                    .update_live(request, |r| r.state = MintState::Pending)
                    .await?
                {
                    Some(request) => request,
                    None => return Ok(()),
                };
                self.run_pipeline(request, shutdown).await
            }
        }
    }

    // -----------------------------------------------------------------------
    // Outcome recording
    // -----------------------------------------------------------------------

    /// Records a retryable failure and schedules the next attempt, or goes
    /// terminal when the attempt cap is reached or a cancel is pending.
    async fn handle_retryable(
        &self,
        mut request: MintRequest,
        nonce: Option<u64>,
        tx_handle: Option<TxHandle>,
        reason: &str,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<(), MintLoopError> {
        loop {
            if request.cancel_requested {
                return self
                    .fail_terminal(
                        request,
                        nonce,
                        tx_handle,
                        &format!("cancelled by operator after: {reason}"),
                        false,
                    )
                    .await;
            }

            // This failure consumed attempt number attempt_count + 1.
            let completed = request.attempt_count + 1;
            if completed >= self.config.max_attempts {
                return self
                    .fail_terminal(
                        request,
                        nonce,
                        tx_handle,
                        &format!("retry budget exhausted after {completed} attempts: {reason}"),
                        true,
                    )
                    .await;
            }

            let fingerprint = request.fingerprint;
            let delay = self.config.backoff.delay_for(completed);
            let due_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);

            match self.ledger.transition(&request, |r| {
                r.state = MintState::FailedRetryable;
                r.last_error = Some(reason.to_string());
                r.next_attempt_at = Some(due_at);
                r.record_attempt(nonce, tx_handle.clone(), format!("retryable: {reason}"));
            }) {
                Ok(updated) => {
                    warn!(
                        fingerprint = %fingerprint,
                        attempt = updated.attempt_count,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "mint attempt failed, retry scheduled"
                    );
                    self.emit(MintEvent::RetryScheduled {
                        fingerprint,
                        attempt: updated.attempt_count + 1,
                        delay_ms: delay.as_millis() as u64,
                        reason: reason.to_string(),
                    });
                    self.schedule_requeue(fingerprint, delay, shutdown.clone());
                    return Ok(());
                }
                Err(LedgerError::VersionConflict { .. }) => match self.reload_live(&fingerprint)? {
                    Some(fresh) => request = fresh,
                    None => return Ok(()),
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Marks a request FAILED_TERMINAL. Emits `Cancelled` instead of
    /// `Failed` when the request was flagged by an operator.
    async fn fail_terminal(
        &self,
        request: MintRequest,
        nonce: Option<u64>,
        tx_handle: Option<TxHandle>,
        reason: &str,
        record_attempt: bool,
    ) -> Result<(), MintLoopError> {
        let fingerprint = request.fingerprint;
        let reason_owned = reason.to_string();

        let updated = self
            .update_live(request, |r| {
                r.state = MintState::FailedTerminal;
                r.last_error = Some(reason_owned.clone());
                r.next_attempt_at = None;
                if record_attempt {
                    r.record_attempt(nonce, tx_handle.clone(), format!("terminal: {reason_owned}"));
                }
            })
            .await?;

        if let Some(updated) = updated {
            warn!(fingerprint = %fingerprint, reason = %reason, "mint request failed terminally");
            let event = if updated.cancel_requested {
                MintEvent::Cancelled { fingerprint }
            } else {
                MintEvent::Failed {
                    fingerprint,
                    reason: reason_owned,
                }
            };
            self.emit(event);
        }
        Ok(())
    }

    /// Sorts a revert into CONFIRMED (duplicate guard) or FAILED_TERMINAL
    /// (anything else).
    async fn classify_revert(
        &self,
        request: MintRequest,
        nonce: Option<u64>,
        tx_handle: Option<TxHandle>,
        reason: &str,
    ) -> Result<(), MintLoopError> {
        if !is_already_verified(reason) {
            return self
                .fail_terminal(
                    request,
                    nonce,
                    tx_handle,
                    &format!("reverted: {reason}"),
                    true,
                )
                .await;
        }

        let fingerprint = request.fingerprint;
        let handle_for_event = tx_handle.clone();
        let updated = self
            .update_live(request, |r| {
                r.state = MintState::Confirmed;
                r.last_error = None;
                r.next_attempt_at = None;
                r.record_attempt(
                    nonce,
                    tx_handle.clone(),
                    "revert: identity already verified, treated as confirmed",
                );
            })
            .await?;

        if updated.is_some() {
            info!(
                fingerprint = %fingerprint,
                "identity already verified on chain, marking confirmed"
            );
            self.emit(MintEvent::Confirmed {
                fingerprint,
                tx_handle: handle_for_event,
                depth: 0,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Store access with budget
    // -----------------------------------------------------------------------

    async fn fetch_with_budget(
        &self,
        id: &ContentId,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Vec<u8>, StoreAbort> {
        let budget = self.config.store_retry_budget.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.get(id).await {
                Ok(bytes) => return Ok(bytes),
                Err(StoreError::NotFound(id)) => {
                    return Err(StoreAbort::Terminal(format!(
                        "evidence blob {id} missing from store"
                    )));
                }
                Err(e) if e.is_retryable() && attempt < budget => {
                    let delay = self.config.backoff.delay_for(attempt);
                    debug!(content_id = %id, attempt, error = %e, "store fetch failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => return Err(StoreAbort::Shutdown),
                    }
                }
                Err(e) => {
                    return Err(StoreAbort::Terminal(format!(
                        "store unavailable after {attempt} attempts: {e}"
                    )));
                }
            }
        }
    }

    async fn put_with_budget(
        &self,
        payload: Vec<u8>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<ContentId, StoreAbort> {
        let budget = self.config.store_retry_budget.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.put(payload.clone()).await {
                Ok(id) => return Ok(id),
                Err(e) if e.is_retryable() && attempt < budget => {
                    let delay = self.config.backoff.delay_for(attempt);
                    debug!(attempt, error = %e, "metadata write failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => return Err(StoreAbort::Shutdown),
                    }
                }
                Err(e) => {
                    return Err(StoreAbort::Terminal(format!(
                        "metadata write failed after {attempt} attempts: {e}"
                    )));
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // CAS plumbing
    // -----------------------------------------------------------------------

    /// Applies a mutation, absorbing version conflicts by reloading. Returns
    /// `None` when the request vanished or went terminal under us.
    async fn update_live<F>(
        &self,
        mut view: MintRequest,
        mutate: F,
    ) -> Result<Option<MintRequest>, MintLoopError>
    where
        F: Fn(&mut MintRequest),
    {
        loop {
            match self.ledger.transition(&view, &mutate) {
                Ok(updated) => return Ok(Some(updated)),
                Err(LedgerError::VersionConflict { fingerprint }) => {
                    match self.reload_live(&fingerprint)? {
                        Some(fresh) => view = fresh,
                        None => return Ok(None),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn reload_live(
        &self,
        fingerprint: &IdentityFingerprint,
    ) -> Result<Option<MintRequest>, MintLoopError> {
        match self.ledger.get_mint_state(fingerprint)? {
            Some(fresh) if !fresh.state.is_terminal() => Ok(Some(fresh)),
            _ => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Re-enqueues a job after a delay, abandoning it on shutdown. The job
    /// is not lost: recovery re-drives parked requests on the next start.
    fn schedule_requeue(
        &self,
        fingerprint: IdentityFingerprint,
        delay: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let requeue = self.requeue.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if requeue.send(MintJob { fingerprint }).await.is_err() {
                        debug!(fingerprint = %fingerprint, "requeue channel closed, dropping job");
                    }
                }
                _ = shutdown.changed() => {}
            }
        });
    }

    fn emit(&self, event: MintEvent) {
        // A send error only means nobody is subscribed right now.
        let _ = self.events.send(event);
    }
}
