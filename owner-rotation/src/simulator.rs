//! Dry run of a built envelope against the latest chain state.
//!
//! Nothing is signed before this succeeds. A stale predecessor or outgoing owner makes the
//! Safe revert here, which is what protects against the owner list changing after resolution.

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolCall;
use owner_rotation_types::{CallRequest, ChainClient};
use tracing::{info, warn};

use crate::{
    builder::{SafeTransaction, UnsignedEnvelope},
    config::ExecutionStrategy,
    errors::RotationError,
    safe::ISafe,
};

/// Pre-validated owner signature: `r = owner`, `s = 0`, `v = 1`.
///
/// The Safe accepts it when `msg.sender == owner`, so the dry run checks authorization
/// without any real signature existing yet.
pub fn prevalidated_signature(owner: Address) -> Bytes {
    let mut sig = [0u8; 65];
    sig[12..32].copy_from_slice(owner.as_slice());
    sig[64] = 1;
    Bytes::from(sig.to_vec())
}

/// `execTransaction` call data for a wallet transaction and its signatures.
pub fn exec_call_data(tx: &SafeTransaction, signatures: Bytes) -> Bytes {
    ISafe::execTransactionCall {
        to: tx.to,
        value: tx.value,
        data: tx.data.clone(),
        operation: tx.operation as u8,
        safeTxGas: tx.safe_tx_gas,
        baseGas: tx.base_gas,
        gasPrice: tx.gas_price,
        gasToken: tx.gas_token,
        refundReceiver: tx.refund_receiver,
        signatures,
    }
    .abi_encode()
    .into()
}

/// The `eth_call` that predicts the broadcast's outcome.
pub fn dry_run_request(envelope: &UnsignedEnvelope) -> CallRequest {
    let data = match envelope.strategy {
        ExecutionStrategy::SafeExec => {
            exec_call_data(&envelope.tx, prevalidated_signature(envelope.sender))
        }
        ExecutionStrategy::DirectCall => envelope.tx.data.clone(),
    };
    CallRequest {
        from: Some(envelope.sender),
        to: envelope.domain.safe,
        data,
    }
}

pub async fn simulate<C: ChainClient>(
    chain: &C,
    envelope: &UnsignedEnvelope,
) -> Result<(), RotationError> {
    let request = dry_run_request(envelope);
    let out = chain.call(&request).await.map_err(|e| {
        warn!(error = %e, strategy = %envelope.strategy, "dry run failed");
        RotationError::simulation(e)
    })?;

    if envelope.strategy == ExecutionStrategy::SafeExec {
        let ret = ISafe::execTransactionCall::abi_decode_returns(&out, true)
            .map_err(|e| RotationError::SimulationFailed(format!("malformed return: {e}")))?;
        if !ret.success {
            warn!("dry run returned false");
            return Err(RotationError::SimulationFailed(
                "execTransaction returned false".into(),
            ));
        }
    }

    info!(hash = %envelope.hash, "dry run succeeded");
    Ok(())
}
