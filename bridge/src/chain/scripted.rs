//! Deterministic chain double for tests.
//!
//! Submit outcomes are queued up front and consumed in order; status
//! sequences are scripted per handle and repeat their final entry forever.
//! Unscripted submits are accepted with a generated handle, unscripted
//! status checks report [`TxStatus::Unknown`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::client::ChainClient;
use super::types::{CallData, ChainError, MintCall, TxHandle, TxStatus};

/// What the scripted chain should do with one `submit` call.
#[derive(Debug, Clone)]
pub enum SubmitScript {
    Accept(TxHandle),
    Transient(String),
    Revert(String),
    InvalidCall(String),
}

/// One call the scripted chain received, decoded and logged for assertions.
#[derive(Debug, Clone)]
pub struct SubmittedCall {
    pub call: MintCall,
    pub nonce: u64,
}

#[derive(Default)]
pub struct ScriptedChain {
    submits: Mutex<VecDeque<SubmitScript>>,
    statuses: Mutex<HashMap<TxHandle, VecDeque<TxStatus>>>,
    log: Mutex<Vec<SubmittedCall>>,
    auto_handle_seq: AtomicU64,
}

impl ScriptedChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome for the next unscripted `submit`.
    pub fn script_submit(&self, outcome: SubmitScript) {
        self.submits.lock().push_back(outcome);
    }

    /// Scripts the status sequence for a handle. The last entry repeats.
    pub fn script_status(
        &self,
        handle: &TxHandle,
        statuses: impl IntoIterator<Item = TxStatus>,
    ) {
        self.statuses
            .lock()
            .insert(handle.clone(), statuses.into_iter().collect());
    }

    /// Every call submitted so far, in order.
    pub fn submitted(&self) -> Vec<SubmittedCall> {
        self.log.lock().clone()
    }

    pub fn submit_count(&self) -> usize {
        self.log.lock().len()
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn submit(&self, call: CallData, nonce: u64) -> Result<TxHandle, ChainError> {
        // Signature checks apply even in tests; a pipeline that signs
        // incorrectly should fail here, not on the devnet.
        let decoded = call.decode_verified()?;
        self.log.lock().push(SubmittedCall { call: decoded, nonce });

        match self.submits.lock().pop_front() {
            Some(SubmitScript::Accept(handle)) => Ok(handle),
            Some(SubmitScript::Transient(reason)) => Err(ChainError::Transient { reason }),
            Some(SubmitScript::Revert(reason)) => Err(ChainError::Reverted { reason }),
            Some(SubmitScript::InvalidCall(reason)) => {
                Err(ChainError::InvalidCall { reason })
            }
            None => {
                let seq = self.auto_handle_seq.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(TxHandle::new(format!("0xauto{seq:012x}")))
            }
        }
    }

    async fn get_status(&self, handle: &TxHandle) -> Result<TxStatus, ChainError> {
        let mut statuses = self.statuses.lock();
        let Some(queue) = statuses.get_mut(handle) else {
            return Ok(TxStatus::Unknown);
        };
        let status = if queue.len() > 1 {
            queue.pop_front().unwrap_or(TxStatus::Unknown)
        } else {
            queue.front().cloned().unwrap_or(TxStatus::Unknown)
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::account::ChainAccount;
    use crate::identity::IdentityFingerprint;
    use crate::store::ContentId;

    fn signed_call(account: &ChainAccount, tag: u8) -> CallData {
        let call = MintCall::new(
            IdentityFingerprint::from_bytes([tag; 32]),
            ContentId::for_bytes(b"metadata"),
        );
        account.sign_call(&call).expect("sign")
    }

    #[tokio::test]
    async fn scripted_outcomes_pop_in_order() {
        let chain = ScriptedChain::new();
        let account = ChainAccount::generate();
        chain.script_submit(SubmitScript::Accept(TxHandle::new("0xaa")));
        chain.script_submit(SubmitScript::Transient("mempool full".into()));

        let first = chain.submit(signed_call(&account, 1), 0).await;
        assert_eq!(first.expect("accept"), TxHandle::new("0xaa"));

        let second = chain.submit(signed_call(&account, 2), 1).await;
        assert!(matches!(second, Err(ChainError::Transient { .. })));

        // Script exhausted: auto-accept.
        let third = chain.submit(signed_call(&account, 3), 2).await;
        assert!(third.is_ok());
        assert_eq!(chain.submit_count(), 3);
    }

    #[tokio::test]
    async fn status_script_repeats_final_entry() {
        let chain = ScriptedChain::new();
        let handle = TxHandle::new("0xaa");
        chain.script_status(
            &handle,
            [TxStatus::Pending, TxStatus::Confirmed { depth: 3 }],
        );

        assert_eq!(chain.get_status(&handle).await.expect("status"), TxStatus::Pending);
        for _ in 0..3 {
            assert_eq!(
                chain.get_status(&handle).await.expect("status"),
                TxStatus::Confirmed { depth: 3 }
            );
        }
    }

    #[tokio::test]
    async fn unknown_handles_report_unknown() {
        let chain = ScriptedChain::new();
        let status = chain.get_status(&TxHandle::new("0xdead")).await.expect("status");
        assert_eq!(status, TxStatus::Unknown);
    }

    #[tokio::test]
    async fn bad_signatures_fail_even_when_scripted_to_accept() {
        let chain = ScriptedChain::new();
        chain.script_submit(SubmitScript::Accept(TxHandle::new("0xaa")));
        let account = ChainAccount::generate();
        let mut data = signed_call(&account, 1);
        data.payload[0] ^= 0xff;
        assert!(matches!(
            chain.submit(data, 0).await,
            Err(ChainError::InvalidCall { .. })
        ));
    }

    #[tokio::test]
    async fn log_records_decoded_calls_and_nonces() {
        let chain = ScriptedChain::new();
        let account = ChainAccount::generate();
        chain.submit(signed_call(&account, 5), 42).await.expect("submit");

        let log = chain.submitted();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].nonce, 42);
        assert_eq!(
            log[0].call.fingerprint,
            IdentityFingerprint::from_bytes([5u8; 32])
        );
    }
}
