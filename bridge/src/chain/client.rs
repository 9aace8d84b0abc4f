//! The chain client capability.

use async_trait::async_trait;

use super::types::{CallData, ChainError, TxHandle, TxStatus};

/// Everything the mint pipeline needs from a registry chain.
///
/// `submit` broadcasts a signed call under an account nonce and returns the
/// handle the chain will track it under. `get_status` reports progress for
/// a handle; pollers decide for themselves how much depth is enough.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn submit(&self, call: CallData, nonce: u64) -> Result<TxHandle, ChainError>;

    async fn get_status(&self, handle: &TxHandle) -> Result<TxStatus, ChainError>;
}
