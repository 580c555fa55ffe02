//! JSON-RPC chain client over ethers.

use std::{future::Future, time::Duration};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{Revert, SolError};
use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider, ProviderError, RpcError},
    types::{transaction::eip2718::TypedTransaction, TransactionRequest},
};
use owner_rotation_types::{CallRequest, ChainClient, ChainError};
use tracing::debug;

use crate::{
    config::ConfigError,
    convert::{from_ethers_bytes, from_ethers_u256, from_h256, to_ethers_bytes, to_h160},
};

/// `ChainClient` backed by an HTTP JSON-RPC endpoint. Every request is bounded by `timeout`.
#[derive(Clone, Debug)]
pub struct EthersChain {
    provider: Provider<Http>,
    timeout: Duration,
}

impl EthersChain {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let provider =
            Provider::<Http>::try_from(rpc_url).map_err(|e| ConfigError::InvalidRpcUrl {
                url: rpc_url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { provider, timeout })
    }

    async fn bounded<T, F>(&self, method: &'static str, fut: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, ProviderError>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                debug!(method, error = %e, "rpc error");
                classify(e)
            }),
            Err(_) => {
                debug!(method, timeout = ?self.timeout, "rpc timed out");
                Err(ChainError::Timeout)
            }
        }
    }
}

/// Node-reported errors become `Rejected`, with the `Error(string)` reason when present.
fn classify(err: ProviderError) -> ChainError {
    match err.as_error_response() {
        Some(resp) => {
            let reason = resp
                .data
                .as_ref()
                .and_then(|d| d.as_str())
                .and_then(|s| hex::decode(s.trim_start_matches("0x")).ok())
                .and_then(|data| revert_reason(&data))
                .unwrap_or_else(|| resp.message.clone());
            ChainError::Rejected { reason }
        }
        None => ChainError::Transport(err.to_string()),
    }
}

/// Decode `Error(string)` revert data.
pub fn revert_reason(data: &[u8]) -> Option<String> {
    Revert::abi_decode(data, true).ok().map(|r| r.reason)
}

#[async_trait]
impl ChainClient for EthersChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        let id = self
            .bounded("eth_chainId", self.provider.get_chainid())
            .await?;
        u64::try_from(id)
            .map_err(|_| ChainError::Transport(format!("chain id {id} does not fit in 64 bits")))
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        let price = self
            .bounded("eth_gasPrice", self.provider.get_gas_price())
            .await?;
        Ok(from_ethers_u256(price))
    }

    async fn transaction_count(&self, account: Address) -> Result<U256, ChainError> {
        let count = self
            .bounded(
                "eth_getTransactionCount",
                self.provider.get_transaction_count(to_h160(account), None),
            )
            .await?;
        Ok(from_ethers_u256(count))
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError> {
        let mut tx = TransactionRequest::new()
            .to(to_h160(request.to))
            .data(to_ethers_bytes(&request.data));
        if let Some(from) = request.from {
            tx = tx.from(to_h160(from));
        }
        let tx = TypedTransaction::Legacy(tx);
        let out = self
            .bounded("eth_call", self.provider.call(&tx, None))
            .await?;
        Ok(from_ethers_bytes(out))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError> {
        let raw = to_ethers_bytes(&raw);
        let hash = self
            .bounded("eth_sendRawTransaction", async {
                self.provider
                    .send_raw_transaction(raw)
                    .await
                    .map(|pending| pending.tx_hash())
            })
            .await?;
        Ok(from_h256(hash))
    }
}
