//! Serialized nonce allocation.
//!
//! The chain account is shared by every worker, and its nonces must be
//! unique for the lifetime of the account. The counter itself lives in the
//! ledger's meta tree; this wrapper adds the async mutex that keeps two
//! workers from reading the same counter value before either writes it
//! back.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::storage::{DbResult, VerificationLedger};

pub struct NonceAllocator {
    ledger: Arc<VerificationLedger>,
    guard: Mutex<()>,
}

impl NonceAllocator {
    pub fn new(ledger: Arc<VerificationLedger>) -> Self {
        Self {
            ledger,
            guard: Mutex::new(()),
        }
    }

    /// Hands out the next nonce. The counter is persisted before this
    /// returns, so a crash can skip a nonce but never repeat one.
    pub async fn allocate(&self) -> DbResult<u64> {
        let _held = self.guard.lock().await;
        self.ledger.next_nonce()
    }
}
