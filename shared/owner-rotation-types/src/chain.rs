use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;

/// Errors at the chain RPC boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The endpoint could not be reached or answered with garbage.
    #[error("transport error: {0}")]
    Transport(String),
    /// The caller-supplied deadline expired before the endpoint answered.
    #[error("rpc call timed out")]
    Timeout,
    /// The node answered with an error: a reverted call or a refused transaction.
    #[error("rejected by node: {reason}")]
    Rejected { reason: String },
}

/// Read-only `eth_call` parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
}

/// Chain access, implemented over JSON-RPC in production and in memory for tests.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn gas_price(&self) -> Result<U256, ChainError>;

    /// Account-level nonce (number of transactions sent by `account`).
    async fn transaction_count(&self, account: Address) -> Result<U256, ChainError>;

    /// Execute a call against the latest state without committing it.
    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError>;

    /// Broadcast a signed, RLP-encoded transaction and return its hash.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError>;
}

#[async_trait]
impl<T: ChainClient + ?Sized> ChainClient for Arc<T> {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        (**self).chain_id().await
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        (**self).gas_price().await
    }

    async fn transaction_count(&self, account: Address) -> Result<U256, ChainError> {
        (**self).transaction_count(account).await
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError> {
        (**self).call(request).await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError> {
        (**self).send_raw_transaction(raw).await
    }
}
