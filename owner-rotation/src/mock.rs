//! In-memory Safe for off-chain testing.
//!
//! Models the parts of a Safe the pipeline touches: the owner linked list, the wallet nonce,
//! `swapOwner` authorization, threshold-1 `execTransaction`, and broadcast of signed legacy
//! transactions that apply their effects. Revert reasons use the Safe's `GSxxx` codes.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use ethers::{types::transaction::eip2718::TypedTransaction, utils::rlp::Rlp};
use owner_rotation_types::{CallRequest, ChainClient, ChainError, Operation, PendingSwap, SENTINEL};

use crate::{
    builder::{safe_tx_hash, SafeTransaction, TxDomain},
    convert::{from_ethers_u256, from_h160},
    safe::ISafe,
    signer::{recover_signer, RecoverableSignature},
    utils::crypto::keccak256_bytes,
};

/// Outcome of a transaction broadcast to the mock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockReceipt {
    pub hash: B256,
    pub from: Address,
    pub success: bool,
    pub reason: Option<String>,
}

#[derive(Default)]
struct MockState {
    owners: Vec<Address>,
    threshold: u64,
    nonce: U256,
    account_nonces: HashMap<Address, U256>,
    direct_callers: HashSet<Address>,
    fail_reads: bool,
    fail_broadcast: bool,
    calls: Vec<CallRequest>,
    receipts: Vec<MockReceipt>,
}

pub struct MockSafe {
    safe: Address,
    chain_id: u64,
    gas_price: U256,
    state: Mutex<MockState>,
}

fn revert(reason: &str) -> ChainError {
    ChainError::Rejected {
        reason: reason.to_string(),
    }
}

impl MockSafe {
    pub fn new(safe: Address, owners: Vec<Address>) -> Self {
        Self {
            safe,
            chain_id: 100,
            gas_price: U256::from(1_000_000_000u64),
            state: Mutex::new(MockState {
                owners,
                threshold: 1,
                ..MockState::default()
            }),
        }
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn safe(&self) -> Address {
        self.safe
    }

    /// Let `caller` invoke `swapOwner` directly, as if it were an enabled module.
    pub fn allow_direct_caller(&self, caller: Address) {
        self.state().direct_callers.insert(caller);
    }

    pub fn set_owners(&self, owners: Vec<Address>) {
        self.state().owners = owners;
    }

    pub fn set_nonce(&self, nonce: U256) {
        self.state().nonce = nonce;
    }

    pub fn set_threshold(&self, threshold: u64) {
        self.state().threshold = threshold;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    pub fn set_fail_broadcast(&self, fail: bool) {
        self.state().fail_broadcast = fail;
    }

    pub fn owners(&self) -> Vec<Address> {
        self.state().owners.clone()
    }

    pub fn nonce(&self) -> U256 {
        self.state().nonce
    }

    pub fn account_nonce(&self, account: Address) -> U256 {
        self.state()
            .account_nonces
            .get(&account)
            .copied()
            .unwrap_or_default()
    }

    /// Every `eth_call` seen so far.
    pub fn calls(&self) -> Vec<CallRequest> {
        self.state().calls.clone()
    }

    /// Every accepted broadcast so far.
    pub fn receipts(&self) -> Vec<MockReceipt> {
        self.state().receipts.clone()
    }
}

fn swap_owners(
    owners: &[Address],
    safe: Address,
    prev: Address,
    old: Address,
    new: Address,
) -> Result<Vec<Address>, ChainError> {
    if new == Address::ZERO || new == SENTINEL || new == safe {
        return Err(revert("GS203"));
    }
    if owners.contains(&new) {
        return Err(revert("GS204"));
    }
    if old == Address::ZERO || old == SENTINEL {
        return Err(revert("GS203"));
    }
    let index = owners
        .iter()
        .position(|o| *o == old)
        .ok_or_else(|| revert("GS205"))?;
    if PendingSwap::predecessor_of(owners, index) != Some(prev) {
        return Err(revert("GS205"));
    }
    let mut next = owners.to_vec();
    next[index] = new;
    Ok(next)
}

impl MockState {
    fn execute(
        &mut self,
        domain: TxDomain,
        from: Option<Address>,
        to: Address,
        data: &[u8],
        commit: bool,
    ) -> Result<Bytes, ChainError> {
        if to != domain.safe {
            return Err(revert("no contract at target"));
        }
        if data.len() < 4 {
            return Err(revert("fallback not supported"));
        }
        let mut sel = [0u8; 4];
        sel.copy_from_slice(&data[..4]);

        if sel == ISafe::getOwnersCall::SELECTOR {
            Ok(ISafe::getOwnersCall::abi_encode_returns(&(self.owners.clone(),)).into())
        } else if sel == ISafe::nonceCall::SELECTOR {
            Ok(ISafe::nonceCall::abi_encode_returns(&(self.nonce,)).into())
        } else if sel == ISafe::getThresholdCall::SELECTOR {
            let threshold = U256::from(self.threshold);
            Ok(ISafe::getThresholdCall::abi_encode_returns(&(threshold,)).into())
        } else if sel == ISafe::swapOwnerCall::SELECTOR {
            let caller = from.unwrap_or(Address::ZERO);
            if caller != domain.safe && !self.direct_callers.contains(&caller) {
                return Err(revert("GS031"));
            }
            let call = ISafe::swapOwnerCall::abi_decode(data, true)
                .map_err(|_| revert("invalid swapOwner call data"))?;
            let next = swap_owners(
                &self.owners,
                domain.safe,
                call.prevOwner,
                call.oldOwner,
                call.newOwner,
            )?;
            if commit {
                self.owners = next;
            }
            Ok(Bytes::new())
        } else if sel == ISafe::execTransactionCall::SELECTOR {
            self.exec_transaction(domain, from, data, commit)
        } else {
            Err(revert("unknown selector"))
        }
    }

    fn exec_transaction(
        &mut self,
        domain: TxDomain,
        from: Option<Address>,
        data: &[u8],
        commit: bool,
    ) -> Result<Bytes, ChainError> {
        let call = ISafe::execTransactionCall::abi_decode(data, true)
            .map_err(|_| revert("invalid execTransaction call data"))?;
        let operation =
            Operation::try_from(call.operation).map_err(|_| revert("invalid operation"))?;
        let tx = SafeTransaction {
            to: call.to,
            value: call.value,
            data: call.data.clone(),
            operation,
            safe_tx_gas: call.safeTxGas,
            base_gas: call.baseGas,
            gas_price: call.gasPrice,
            gas_token: call.gasToken,
            refund_receiver: call.refundReceiver,
            nonce: self.nonce,
        };
        let hash = safe_tx_hash(&domain, &tx);

        let required = self.threshold.max(1) * 65;
        if (call.signatures.len() as u64) < required {
            return Err(revert("GS020"));
        }
        self.check_signature(hash, &call.signatures[..65], from)?;

        if operation != Operation::Call {
            return Err(revert("GS013"));
        }
        // Inner call runs with the Safe as msg.sender; with no safeTxGas/gasPrice a failure
        // reverts the whole execution.
        self.execute(domain, Some(domain.safe), tx.to, &tx.data, commit)
            .map_err(|_| revert("GS013"))?;

        if commit {
            self.nonce += U256::from(1u64);
        }
        Ok(ISafe::execTransactionCall::abi_encode_returns(&(true,)).into())
    }

    fn check_signature(
        &self,
        hash: B256,
        sig: &[u8],
        from: Option<Address>,
    ) -> Result<Address, ChainError> {
        let owner = match sig[64] {
            1 => {
                let owner = Address::from_slice(&sig[12..32]);
                if from != Some(owner) {
                    return Err(revert("GS025"));
                }
                owner
            }
            27 | 28 => {
                let parsed = RecoverableSignature::from_safe_bytes(sig).ok_or_else(|| revert("GS026"))?;
                recover_signer(hash, &parsed).ok_or_else(|| revert("GS026"))?
            }
            _ => return Err(revert("GS026")),
        };
        if !self.owners.contains(&owner) {
            return Err(revert("GS026"));
        }
        Ok(owner)
    }
}

#[async_trait]
impl ChainClient for MockSafe {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        if self.state().fail_reads {
            return Err(ChainError::Transport("connection refused".into()));
        }
        Ok(self.chain_id)
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        if self.state().fail_reads {
            return Err(ChainError::Transport("connection refused".into()));
        }
        Ok(self.gas_price)
    }

    async fn transaction_count(&self, account: Address) -> Result<U256, ChainError> {
        if self.state().fail_reads {
            return Err(ChainError::Transport("connection refused".into()));
        }
        Ok(self.account_nonce(account))
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError> {
        let domain = TxDomain {
            chain_id: self.chain_id,
            safe: self.safe,
        };
        let mut state = self.state();
        if state.fail_reads {
            return Err(ChainError::Transport("connection refused".into()));
        }
        state.calls.push(request.clone());
        state.execute(domain, request.from, request.to, &request.data, false)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError> {
        let domain = TxDomain {
            chain_id: self.chain_id,
            safe: self.safe,
        };
        let mut state = self.state();
        if state.fail_broadcast {
            return Err(ChainError::Transport("connection reset by peer".into()));
        }

        let rlp = Rlp::new(&raw);
        let (tx, sig) = TypedTransaction::decode_signed(&rlp)
            .map_err(|e| revert(&format!("invalid transaction: {e}")))?;
        if tx.chain_id().map(|c| c.as_u64()) != Some(self.chain_id) {
            return Err(revert("invalid chain id"));
        }
        let from = sig
            .recover(tx.sighash())
            .map(from_h160)
            .map_err(|_| revert("invalid sender"))?;

        let nonce = tx.nonce().copied().map(from_ethers_u256).unwrap_or_default();
        let expected = state.account_nonces.get(&from).copied().unwrap_or_default();
        if nonce < expected {
            return Err(revert("nonce too low"));
        }
        if nonce > expected {
            return Err(revert("nonce too high"));
        }
        let to = tx
            .to_addr()
            .copied()
            .map(from_h160)
            .ok_or_else(|| revert("contract creation not supported"))?;
        let data = tx.data().map(|d| d.to_vec()).unwrap_or_default();

        let outcome = state.execute(domain, Some(from), to, &data, true);
        state.account_nonces.insert(from, nonce + U256::from(1u64));

        let hash = keccak256_bytes(&raw);
        state.receipts.push(MockReceipt {
            hash,
            from,
            success: outcome.is_ok(),
            reason: outcome.err().map(|e| e.to_string()),
        });
        Ok(hash)
    }
}
