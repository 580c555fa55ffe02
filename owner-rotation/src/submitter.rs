//! Signing and broadcast of a simulated envelope.
//!
//! Broadcast consumes the account nonce. A `BroadcastFailed` may be retried only with a
//! freshly built envelope once the caller knows the nonce was not used.

use std::fmt;

use alloy_primitives::{Bytes, B256};
use async_trait::async_trait;
use owner_rotation_types::ChainClient;
use tracing::info;

use crate::{
    builder::{legacy_transaction, UnsignedEnvelope},
    config::ExecutionStrategy,
    convert::from_h256,
    errors::RotationError,
    signer::{sign_legacy, TxSigner},
    simulator::exec_call_data,
};

/// Hash of a broadcast transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TxId(pub B256);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[async_trait]
pub trait Submitter: Send + Sync {
    /// Sign `envelope` and broadcast it. Does not wait for inclusion.
    async fn submit(&self, envelope: &UnsignedEnvelope) -> Result<TxId, RotationError>;
}

fn check_envelope<S: TxSigner>(
    signer: &S,
    envelope: &UnsignedEnvelope,
    expected: ExecutionStrategy,
) -> Result<(), RotationError> {
    if envelope.strategy != expected {
        return Err(RotationError::SigningFailed(format!(
            "envelope built for {}, submitter is {expected}",
            envelope.strategy
        )));
    }
    if envelope.sender != signer.address() {
        return Err(RotationError::SigningFailed(format!(
            "envelope sender {} is not the signer {}",
            envelope.sender,
            signer.address()
        )));
    }
    Ok(())
}

async fn broadcast<C: ChainClient>(chain: &C, raw: Bytes) -> Result<TxId, RotationError> {
    let hash = chain
        .send_raw_transaction(raw)
        .await
        .map_err(RotationError::broadcast)?;
    Ok(TxId(hash))
}

/// Wallet-native execution: signature over the SafeTx hash, carried by `execTransaction`.
pub struct SafeExecSubmitter<'a, C, S> {
    chain: &'a C,
    signer: &'a S,
}

impl<'a, C, S> SafeExecSubmitter<'a, C, S> {
    pub fn new(chain: &'a C, signer: &'a S) -> Self {
        Self { chain, signer }
    }
}

#[async_trait]
impl<'a, C: ChainClient, S: TxSigner> Submitter for SafeExecSubmitter<'a, C, S> {
    async fn submit(&self, envelope: &UnsignedEnvelope) -> Result<TxId, RotationError> {
        check_envelope(self.signer, envelope, ExecutionStrategy::SafeExec)?;

        let signature = self.signer.sign_prehash(envelope.hash)?;
        let data = exec_call_data(&envelope.tx, Bytes::from(signature.to_safe_bytes().to_vec()));
        let outer = legacy_transaction(
            envelope.domain.chain_id,
            envelope.sender,
            envelope.domain.safe,
            &data,
            envelope.account_nonce,
            &envelope.gas,
        );
        let raw = sign_legacy(self.signer, &outer, envelope.domain.chain_id)?;

        let id = broadcast(self.chain, raw).await?;
        info!(tx = %id, safe_nonce = %envelope.tx.nonce, "broadcast execTransaction");
        Ok(id)
    }
}

/// Plain transaction calling `swapOwner` directly; the envelope hash is its signing hash.
pub struct DirectCallSubmitter<'a, C, S> {
    chain: &'a C,
    signer: &'a S,
}

impl<'a, C, S> DirectCallSubmitter<'a, C, S> {
    pub fn new(chain: &'a C, signer: &'a S) -> Self {
        Self { chain, signer }
    }
}

#[async_trait]
impl<'a, C: ChainClient, S: TxSigner> Submitter for DirectCallSubmitter<'a, C, S> {
    async fn submit(&self, envelope: &UnsignedEnvelope) -> Result<TxId, RotationError> {
        check_envelope(self.signer, envelope, ExecutionStrategy::DirectCall)?;

        let outer = legacy_transaction(
            envelope.domain.chain_id,
            envelope.sender,
            envelope.domain.safe,
            &envelope.tx.data,
            envelope.account_nonce,
            &envelope.gas,
        );
        if from_h256(outer.sighash()) != envelope.hash {
            return Err(RotationError::SigningFailed(
                "transaction does not match the simulated envelope".into(),
            ));
        }
        let raw = sign_legacy(self.signer, &outer, envelope.domain.chain_id)?;

        let id = broadcast(self.chain, raw).await?;
        info!(tx = %id, account_nonce = %envelope.account_nonce, "broadcast swapOwner");
        Ok(id)
    }
}
