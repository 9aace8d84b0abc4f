//! # Devnet Chain
//!
//! A single-node development chain that runs the registry contract behind
//! the bridge's `ChainClient` capability. Calls execute the moment they are
//! accepted into the mempool; what `get_status` reports is gated on block
//! height, so pollers see the same Pending -> Confirmed / Reverted
//! progression they would against a real network.
//!
//! ```text
//!   submit(call, nonce)
//!      |  verify signature          -> InvalidCall
//!      |  dedupe (account, nonce)   -> Transient "nonce conflict"
//!      |  execute contract mint     -> outcome recorded, not yet visible
//!      v
//!   TxRecord { included_at: height + 1, outcome }
//!
//!   get_status(handle)
//!      height <  included_at  -> Pending
//!      height >= included_at  -> Confirmed { depth } | Reverted { reason }
//! ```
//!
//! Blocks advance either manually ([`DevnetChain::advance_block`], the mode
//! tests use) or on a timer ([`DevnetChain::spawn_ticker`], the mode the
//! node daemon uses). Depth is the number of blocks sealed on top of the
//! inclusion block.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use pearid_bridge::chain::{CallData, ChainClient, ChainError, TxHandle, TxStatus};

use crate::registry::RegistryContract;

/// What the devnet remembers about an accepted transaction.
#[derive(Debug, Clone)]
struct TxRecord {
    /// Height of the block the transaction lands in.
    included_at: u64,
    /// Minted token id, or the revert reason.
    outcome: Result<u64, String>,
}

struct DevnetInner {
    contract: Mutex<RegistryContract>,
    transactions: Mutex<HashMap<TxHandle, TxRecord>>,
    /// (account public key, nonce) pairs already accepted.
    seen_nonces: Mutex<HashSet<([u8; 32], u64)>>,
    height: AtomicU64,
}

/// The devnet chain. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DevnetChain {
    inner: Arc<DevnetInner>,
}

impl DevnetChain {
    /// Creates a devnet at height 0 with an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DevnetInner {
                contract: Mutex::new(RegistryContract::new()),
                transactions: Mutex::new(HashMap::new()),
                seen_nonces: Mutex::new(HashSet::new()),
                height: AtomicU64::new(0),
            }),
        }
    }

    /// Seals one block and returns the new height.
    pub fn advance_block(&self) -> u64 {
        let height = self.inner.height.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(height, "devnet block sealed");
        height
    }

    /// Seals `count` blocks and returns the final height.
    pub fn advance_blocks(&self, count: u64) -> u64 {
        let mut height = self.height();
        for _ in 0..count {
            height = self.advance_block();
        }
        height
    }

    /// Current chain height.
    pub fn height(&self) -> u64 {
        self.inner.height.load(Ordering::SeqCst)
    }

    /// Direct access to the registry contract, for operator tooling and
    /// test assertions. Holding the guard blocks submits.
    pub fn registry(&self) -> MutexGuard<'_, RegistryContract> {
        self.inner.contract.lock()
    }

    /// Number of transactions the devnet has accepted.
    pub fn transaction_count(&self) -> usize {
        self.inner.transactions.lock().len()
    }

    /// Seals a block every `block_time` until the shutdown flag flips.
    pub fn spawn_ticker(
        &self,
        block_time: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let chain = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_time);
            // The first tick completes immediately; consume it so the first
            // block lands one full period after start.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        chain.advance_block();
                    }
                    _ = shutdown.changed() => {
                        info!(height = chain.height(), "devnet ticker stopped");
                        return;
                    }
                }
            }
        })
    }

    fn handle_for(payload: &[u8], nonce: u64) -> TxHandle {
        let mut hasher = blake3::Hasher::new();
        hasher.update(payload);
        hasher.update(&nonce.to_be_bytes());
        let digest = hasher.finalize();
        TxHandle::new(format!("0x{}", hex::encode(&digest.as_bytes()[..16])))
    }
}

impl Default for DevnetChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClient for DevnetChain {
    async fn submit(&self, call: CallData, nonce: u64) -> Result<TxHandle, ChainError> {
        let decoded = call.decode_verified()?;

        // Per-account replay protection. A nonce is burned on acceptance,
        // even if the call later reverts.
        {
            let mut seen = self.inner.seen_nonces.lock();
            if !seen.insert((call.public_key, nonce)) {
                return Err(ChainError::Transient {
                    reason: format!("nonce conflict: {nonce} already used by this account"),
                });
            }
        }

        // Execution is eager; visibility is deferred until the inclusion
        // block is sealed.
        let outcome = {
            let mut contract = self.inner.contract.lock();
            contract
                .mint(decoded.idempotency_key, decoded.metadata)
                .map(|token| token.token_id)
                .map_err(|e| e.to_string())
        };

        let handle = Self::handle_for(&call.payload, nonce);
        let included_at = self.height() + 1;
        self.inner.transactions.lock().insert(
            handle.clone(),
            TxRecord {
                included_at,
                outcome,
            },
        );
        debug!(%handle, nonce, included_at, "devnet accepted mint call");
        Ok(handle)
    }

    async fn get_status(&self, handle: &TxHandle) -> Result<TxStatus, ChainError> {
        let transactions = self.inner.transactions.lock();
        let Some(record) = transactions.get(handle) else {
            return Ok(TxStatus::Unknown);
        };
        let height = self.height();
        if height < record.included_at {
            return Ok(TxStatus::Pending);
        }
        match &record.outcome {
            Ok(_) => Ok(TxStatus::Confirmed {
                depth: (height - record.included_at) as u32,
            }),
            Err(reason) => Ok(TxStatus::Reverted {
                reason: reason.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pearid_bridge::chain::{ChainAccount, MintCall};
    use pearid_bridge::identity::IdentityFingerprint;
    use pearid_bridge::store::ContentId;

    fn signed_call(account: &ChainAccount, tag: u8) -> CallData {
        let call = MintCall::new(
            IdentityFingerprint::from_bytes([tag; 32]),
            ContentId::for_bytes(&[tag; 16]),
        );
        account.sign_call(&call).expect("sign")
    }

    #[tokio::test]
    async fn handles_are_distinct_per_nonce() {
        let chain = DevnetChain::new();
        let account = ChainAccount::generate();
        let a = chain.submit(signed_call(&account, 1), 0).await.expect("submit");
        let b = chain.submit(signed_call(&account, 2), 1).await.expect("submit");
        assert_ne!(a, b);
        assert_eq!(chain.transaction_count(), 2);
    }

    #[tokio::test]
    async fn execution_happens_once_at_submit() {
        let chain = DevnetChain::new();
        let account = ChainAccount::generate();
        chain.submit(signed_call(&account, 1), 0).await.expect("submit");

        // The token exists before any block is sealed; only status
        // reporting waits for inclusion.
        assert_eq!(chain.registry().token_count(), 1);
        assert_eq!(chain.height(), 0);
    }
}
