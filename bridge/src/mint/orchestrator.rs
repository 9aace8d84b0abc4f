//! # Mint Orchestrator
//!
//! Front door of the bridging pipeline. The orchestrator owns the worker
//! pool and the durable staging step that connects a verification decision
//! to a mint:
//!
//! ```text
//!   record_decision(APPROVED)
//!        |
//!        v
//!   Ledger: VerificationRecord (CAS, unique)
//!        |
//!        v
//!   Ledger: MintRequest PENDING (CAS, one active slot)
//!        |
//!        v
//!   partition queue --> MintWorker pipeline --> chain
//! ```
//!
//! ## Partitioning
//!
//! Jobs hash to a partition by the fingerprint's leading bytes, one worker
//! task per partition. All work for one fingerprint lands on one worker,
//! so request mutation is single-writer by construction; different
//! fingerprints proceed in parallel.
//!
//! ## Operator surface
//!
//! `recover` re-drives whatever a previous process left behind, `cancel`
//! and `resubmit` expose the manual paths, and `subscribe` hands out the
//! lifecycle event stream the node API and metrics exporter consume.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chain::{ChainAccount, ChainClient, TxHandle};
use crate::config::{
    DEFAULT_CONFIRMATION_DEADLINE, DEFAULT_CONFIRMATION_DEPTH, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_DEPTH, DEFAULT_STORE_RETRY_BUDGET, DEFAULT_WORKER_COUNT,
};
use crate::identity::IdentityFingerprint;
use crate::storage::{
    DbError, Decision, LedgerError, MintRequest, MintState, StageOutcome, VerificationLedger,
    VerificationRecord,
};
use crate::store::{BlobStore, ContentId};

use super::backoff::BackoffPolicy;
use super::nonce::NonceAllocator;
use super::worker::MintWorker;

/// Lifecycle events dropped by slow subscribers rather than blocking the
/// pipeline; this capacity absorbs normal bursts.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunable parameters for the orchestrator and its workers.
///
/// Defaults suit a devnet with one-second blocks. Production deployments
/// raise `confirmation_deadline` and `poll_interval` to match real block
/// times, and size `workers` to the expected approval rate.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Worker tasks, one per fingerprint partition.
    pub workers: usize,

    /// Buffered jobs per partition queue.
    pub queue_depth: usize,

    /// Broadcast attempts per mint request before FAILED_TERMINAL.
    pub max_attempts: u32,

    /// Store calls per fetch or put before the request goes terminal.
    pub store_retry_budget: u32,

    /// Blocks on top of inclusion required to call a mint confirmed.
    pub confirmation_depth: u32,

    /// Interval between status polls for a submitted transaction.
    pub poll_interval: Duration,

    /// How long a submitted transaction may stay unresolved before the
    /// attempt is treated as transient and rebroadcast.
    pub confirmation_deadline: Duration,

    /// Backoff between broadcast attempts and store retries.
    pub backoff: BackoffPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKER_COUNT,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            store_retry_budget: DEFAULT_STORE_RETRY_BUDGET,
            confirmation_depth: DEFAULT_CONFIRMATION_DEPTH,
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirmation_deadline: DEFAULT_CONFIRMATION_DEADLINE,
            backoff: BackoffPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Jobs and events
// ---------------------------------------------------------------------------

/// One unit of work: drive whatever request is active for a fingerprint.
/// Carrying only the fingerprint keeps jobs safe to replay; the worker
/// always reads the current state from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintJob {
    pub fingerprint: IdentityFingerprint,
}

/// Lifecycle notifications, broadcast to the node API and metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MintEvent {
    Staged {
        fingerprint: IdentityFingerprint,
    },
    Submitted {
        fingerprint: IdentityFingerprint,
        tx_handle: TxHandle,
        attempt: u32,
    },
    RetryScheduled {
        fingerprint: IdentityFingerprint,
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    Confirmed {
        fingerprint: IdentityFingerprint,
        tx_handle: Option<TxHandle>,
        depth: u32,
    },
    Failed {
        fingerprint: IdentityFingerprint,
        reason: String,
    },
    Cancelled {
        fingerprint: IdentityFingerprint,
    },
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that end a worker loop.
#[derive(Debug)]
pub enum MintLoopError {
    /// Ledger or database failure.
    Ledger(LedgerError),

    /// The partition queue closed while the worker was still running.
    QueueClosed,

    /// Metadata or call encoding failed.
    Encode(String),

    /// The shutdown signal was received. This is the clean exit, not a
    /// failure.
    Shutdown,
}

impl fmt::Display for MintLoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ledger(e) => write!(f, "ledger error: {}", e),
            Self::QueueClosed => write!(f, "partition queue closed"),
            Self::Encode(e) => write!(f, "encoding failed: {}", e),
            Self::Shutdown => write!(f, "mint worker received shutdown signal"),
        }
    }
}

impl std::error::Error for MintLoopError {}

impl From<LedgerError> for MintLoopError {
    fn from(e: LedgerError) -> Self {
        Self::Ledger(e)
    }
}

impl From<DbError> for MintLoopError {
    fn from(e: DbError) -> Self {
        Self::Ledger(e.into())
    }
}

// ---------------------------------------------------------------------------
// Recovery report
// ---------------------------------------------------------------------------

/// What a startup recovery sweep found and re-drove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub requeued_pending: usize,
    pub requeued_retryable: usize,
    pub resumed_submitted: usize,
    pub restaged_approvals: usize,
}

impl RecoveryReport {
    pub fn total(&self) -> usize {
        self.requeued_pending
            + self.requeued_retryable
            + self.resumed_submitted
            + self.restaged_approvals
    }
}

// ---------------------------------------------------------------------------
// MintOrchestrator
// ---------------------------------------------------------------------------

/// Owns the worker pool and routes approved identities into it.
pub struct MintOrchestrator {
    ledger: Arc<VerificationLedger>,
    partitions: Vec<mpsc::Sender<MintJob>>,
    events: broadcast::Sender<MintEvent>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<Result<(), MintLoopError>>>>,
}

impl MintOrchestrator {
    /// Spawns the worker pool and returns the running orchestrator.
    ///
    /// Does not touch existing ledger state; call
    /// [`recover`](Self::recover) afterwards to re-drive requests left
    /// behind by a previous process.
    pub fn start(
        ledger: Arc<VerificationLedger>,
        store: Arc<dyn BlobStore>,
        chain: Arc<dyn ChainClient>,
        account: Arc<ChainAccount>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let config = Arc::new(config);
        let worker_count = config.workers.max(1);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let nonces = Arc::new(NonceAllocator::new(Arc::clone(&ledger)));

        let mut partitions = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);
        for partition in 0..worker_count {
            let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
            let worker = Arc::new(MintWorker::new(
                partition,
                Arc::clone(&ledger),
                Arc::clone(&store),
                Arc::clone(&chain),
                Arc::clone(&account),
                Arc::clone(&nonces),
                Arc::clone(&config),
                events.clone(),
                tx.clone(),
            ));
            handles.push(tokio::spawn(worker.run(rx, shutdown_rx.clone())));
            partitions.push(tx);
        }

        info!(workers = worker_count, "mint orchestrator started");

        Arc::new(Self {
            ledger,
            partitions,
            events,
            shutdown: shutdown_tx,
            workers: Mutex::new(handles),
        })
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Records a verification decision; an approval is staged for minting
    /// in the same call.
    pub async fn record_decision(
        &self,
        fingerprint: IdentityFingerprint,
        decision: Decision,
        evidence_content_id: ContentId,
    ) -> Result<VerificationRecord, LedgerError> {
        let record = self
            .ledger
            .record_verification(fingerprint, decision, evidence_content_id)?;
        if decision == Decision::Approved {
            self.stage_approval(fingerprint).await?;
        }
        Ok(record)
    }

    /// Stages a mint request for an already-approved fingerprint and hands
    /// it to its partition. A no-op when the slot is occupied.
    pub async fn stage_approval(
        &self,
        fingerprint: IdentityFingerprint,
    ) -> Result<(), LedgerError> {
        match self.ledger.create_mint_request(fingerprint)? {
            StageOutcome::Created(_) => {
                self.emit(MintEvent::Staged { fingerprint });
                self.enqueue(fingerprint).await;
            }
            StageOutcome::Existing(existing) => {
                debug!(
                    fingerprint = %fingerprint,
                    state = %existing.state,
                    "mint request already staged"
                );
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Recovery and operator paths
    // -----------------------------------------------------------------------

    /// Re-drives every request a previous process left unfinished, and
    /// stages approvals that never got a request at all.
    pub async fn recover(&self) -> Result<RecoveryReport, LedgerError> {
        let mut report = RecoveryReport::default();

        for request in self.ledger.active_requests()? {
            match request.state {
                MintState::Pending => {
                    report.requeued_pending += 1;
                    self.enqueue(request.fingerprint).await;
                }
                MintState::FailedRetryable => {
                    report.requeued_retryable += 1;
                    self.enqueue(request.fingerprint).await;
                }
                MintState::Submitted => {
                    report.resumed_submitted += 1;
                    self.enqueue(request.fingerprint).await;
                }
                MintState::Confirmed | MintState::FailedTerminal => {}
            }
        }

        for fingerprint in self.ledger.unbridged_approvals()? {
            if self.ledger.create_mint_request(fingerprint)?.is_created() {
                report.restaged_approvals += 1;
                self.emit(MintEvent::Staged { fingerprint });
                self.enqueue(fingerprint).await;
            }
        }

        if report.total() > 0 {
            info!(
                pending = report.requeued_pending,
                retryable = report.requeued_retryable,
                submitted = report.resumed_submitted,
                restaged = report.restaged_approvals,
                "recovery sweep complete"
            );
        }
        Ok(report)
    }

    /// Cancels a mint request.
    ///
    /// PENDING and FAILED_RETRYABLE requests go FAILED_TERMINAL here and
    /// now. A SUBMITTED request only gets the flag: the broadcast cannot
    /// be withdrawn, but no further retries will happen. Terminal requests
    /// refuse.
    pub async fn cancel(
        &self,
        fingerprint: IdentityFingerprint,
    ) -> Result<MintRequest, LedgerError> {
        let request = self
            .ledger
            .get_mint_state(&fingerprint)?
            .ok_or(LedgerError::NotFound { fingerprint })?;

        match request.state {
            MintState::Confirmed | MintState::FailedTerminal => {
                Err(LedgerError::InvalidTransition {
                    from: request.state,
                    to: MintState::FailedTerminal,
                })
            }
            MintState::Pending | MintState::FailedRetryable => {
                let updated = self.ledger.transition(&request, |r| {
                    r.cancel_requested = true;
                    r.state = MintState::FailedTerminal;
                    r.last_error = Some("cancelled by operator".into());
                    r.next_attempt_at = None;
                })?;
                info!(fingerprint = %fingerprint, "mint request cancelled");
                self.emit(MintEvent::Cancelled { fingerprint });
                Ok(updated)
            }
            MintState::Submitted => {
                let updated = self
                    .ledger
                    .transition(&request, |r| r.cancel_requested = true)?;
                info!(
                    fingerprint = %fingerprint,
                    "cancel flagged on submitted request, broadcast cannot be withdrawn"
                );
                Ok(updated)
            }
        }
    }

    /// Archives a FAILED_TERMINAL request and stages a fresh attempt.
    ///
    /// Refused when a CONFIRMED request exists. A request still in flight
    /// is returned unchanged; there is nothing to resubmit yet.
    pub async fn resubmit(
        &self,
        fingerprint: IdentityFingerprint,
    ) -> Result<MintRequest, LedgerError> {
        if let Some(active) = self.ledger.get_mint_state(&fingerprint)? {
            match active.state {
                MintState::Confirmed => {
                    return Err(LedgerError::AlreadyConfirmed { fingerprint });
                }
                MintState::FailedTerminal => {
                    self.ledger.archive_request(&fingerprint)?;
                }
                _ => return Ok(active),
            }
        }

        let outcome = self.ledger.create_mint_request(fingerprint)?;
        let request = outcome.request().clone();
        if outcome.is_created() {
            info!(fingerprint = %fingerprint, "mint request resubmitted");
            self.emit(MintEvent::Staged { fingerprint });
            self.enqueue(fingerprint).await;
        }
        Ok(request)
    }

    /// Subscribes to the lifecycle event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<MintEvent> {
        self.events.subscribe()
    }

    pub fn ledger(&self) -> &Arc<VerificationLedger> {
        &self.ledger
    }

    /// Signals shutdown and joins every worker. In-flight requests stay
    /// in the ledger for the next start's recovery sweep.
    pub async fn shutdown(&self) {
        info!("mint orchestrator shutting down");
        let _ = self.shutdown.send(true);

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            match handle.await {
                Ok(Ok(())) | Ok(Err(MintLoopError::Shutdown)) => {}
                Ok(Err(e)) => warn!(error = %e, "mint worker exited with error"),
                Err(e) => warn!(error = %e, "mint worker task panicked"),
            }
        }

        if let Err(e) = self.ledger.flush() {
            warn!(error = %e, "final ledger flush failed");
        }
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    async fn enqueue(&self, fingerprint: IdentityFingerprint) {
        let partition = self.partition_for(&fingerprint);
        if self.partitions[partition]
            .send(MintJob { fingerprint })
            .await
            .is_err()
        {
            warn!(fingerprint = %fingerprint, partition, "worker queue closed, job dropped");
        }
    }

    /// Stable fingerprint-to-partition routing. The fingerprint is a
    /// BLAKE3 digest, so its leading bytes are already uniform.
    fn partition_for(&self, fingerprint: &IdentityFingerprint) -> usize {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&fingerprint.as_bytes()[..8]);
        (u64::from_be_bytes(prefix) % self.partitions.len() as u64) as usize
    }

    fn emit(&self, event: MintEvent) {
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
