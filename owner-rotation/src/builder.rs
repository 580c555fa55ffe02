//! Multisig transaction envelope construction and hashing.
//!
//! All chain state the later stages depend on (chain id, gas price, nonces) is read here,
//! so simulation and signing operate on exactly the envelope produced by [`TransactionBuilder::build`].

use alloy_primitives::{Address, Bytes, B256, U256};
use ethers::types::{transaction::eip2718::TypedTransaction, TransactionRequest};
use owner_rotation_types::{ChainClient, Operation};
use tracing::debug;

use crate::{
    config::ExecutionStrategy,
    convert::{from_h256, to_ethers_bytes, to_ethers_u256, to_h160},
    errors::RotationError,
    resolver::OwnerRegistry,
    utils::{
        bytes::{write_address_word, write_u256_word},
        crypto::keccak256_bytes,
    },
};

pub const DOMAIN_SEPARATOR_TYPE: &[u8] = b"EIP712Domain(uint256 chainId,address verifyingContract)";

pub const SAFE_TX_TYPE: &[u8] = b"SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)";

/// Wallet-level transaction, as the Safe hashes and executes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafeTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    pub nonce: U256,
}

impl SafeTransaction {
    /// Zero-value direct call with no refund or gas accounting.
    pub fn call(to: Address, data: Bytes, nonce: U256) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data,
            operation: Operation::Call,
            safe_tx_gas: U256::ZERO,
            base_gas: U256::ZERO,
            gas_price: U256::ZERO,
            gas_token: Address::ZERO,
            refund_receiver: Address::ZERO,
            nonce,
        }
    }
}

/// Domain parameters bound into the hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxDomain {
    pub chain_id: u64,
    pub safe: Address,
}

/// Gas parameters of the account-level transaction that carries the call on chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasParams {
    pub gas_limit: U256,
    pub gas_price: U256,
}

/// A freshly built, not yet signed envelope. Never reuse one across attempts: the nonces
/// inside are only valid for a single broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedEnvelope {
    pub strategy: ExecutionStrategy,
    pub domain: TxDomain,
    pub tx: SafeTransaction,
    /// Account that signs and broadcasts.
    pub sender: Address,
    /// Account-level nonce used for the broadcast transaction.
    pub account_nonce: U256,
    pub gas: GasParams,
    /// Digest that gets signed: the SafeTx hash for `SafeExec`, the EIP-155 signing hash for
    /// `DirectCall`.
    pub hash: B256,
}

pub fn domain_separator(domain: &TxDomain) -> B256 {
    let mut buf = Vec::with_capacity(32 * 3);
    buf.extend_from_slice(keccak256_bytes(DOMAIN_SEPARATOR_TYPE).as_slice());
    write_u256_word(&mut buf, U256::from(domain.chain_id));
    write_address_word(&mut buf, domain.safe);
    keccak256_bytes(&buf)
}

/// Safe EIP-712 digest of a wallet transaction (what `getTransactionHash` returns on chain).
pub fn safe_tx_hash(domain: &TxDomain, tx: &SafeTransaction) -> B256 {
    let mut struct_buf = Vec::with_capacity(32 * 11);
    struct_buf.extend_from_slice(keccak256_bytes(SAFE_TX_TYPE).as_slice());
    write_address_word(&mut struct_buf, tx.to);
    write_u256_word(&mut struct_buf, tx.value);
    struct_buf.extend_from_slice(keccak256_bytes(&tx.data).as_slice());
    write_u256_word(&mut struct_buf, U256::from(tx.operation as u8));
    write_u256_word(&mut struct_buf, tx.safe_tx_gas);
    write_u256_word(&mut struct_buf, tx.base_gas);
    write_u256_word(&mut struct_buf, tx.gas_price);
    write_address_word(&mut struct_buf, tx.gas_token);
    write_address_word(&mut struct_buf, tx.refund_receiver);
    write_u256_word(&mut struct_buf, tx.nonce);
    let struct_hash = keccak256_bytes(&struct_buf);

    // keccak256("\x19\x01" || domainSeparator || structHash)
    let mut final_buf = Vec::with_capacity(2 + 32 + 32);
    final_buf.extend_from_slice(b"\x19\x01");
    final_buf.extend_from_slice(domain_separator(domain).as_slice());
    final_buf.extend_from_slice(struct_hash.as_slice());
    keccak256_bytes(&final_buf)
}

/// Legacy EIP-155 transaction from `from` to `to` carrying `data`.
pub fn legacy_transaction(
    chain_id: u64,
    from: Address,
    to: Address,
    data: &Bytes,
    nonce: U256,
    gas: &GasParams,
) -> TypedTransaction {
    let request = TransactionRequest::new()
        .from(to_h160(from))
        .to(to_h160(to))
        .value(0u64)
        .data(to_ethers_bytes(data))
        .nonce(to_ethers_u256(nonce))
        .gas(to_ethers_u256(gas.gas_limit))
        .gas_price(to_ethers_u256(gas.gas_price))
        .chain_id(chain_id);
    TypedTransaction::Legacy(request)
}

/// Digest signed for a given strategy. Deterministic in all of its inputs.
pub fn envelope_hash(
    strategy: ExecutionStrategy,
    domain: &TxDomain,
    tx: &SafeTransaction,
    sender: Address,
    account_nonce: U256,
    gas: &GasParams,
) -> B256 {
    match strategy {
        ExecutionStrategy::SafeExec => safe_tx_hash(domain, tx),
        ExecutionStrategy::DirectCall => {
            let outer =
                legacy_transaction(domain.chain_id, sender, tx.to, &tx.data, account_nonce, gas);
            from_h256(outer.sighash())
        }
    }
}

/// Reads fresh chain state and wraps call data into an [`UnsignedEnvelope`].
pub struct TransactionBuilder<'a, C> {
    chain: &'a C,
    safe: Address,
    strategy: ExecutionStrategy,
    gas_limit: u64,
}

impl<'a, C: ChainClient> TransactionBuilder<'a, C> {
    pub fn new(chain: &'a C, safe: Address, strategy: ExecutionStrategy, gas_limit: u64) -> Self {
        Self {
            chain,
            safe,
            strategy,
            gas_limit,
        }
    }

    pub async fn build(
        &self,
        sender: Address,
        call_data: Bytes,
    ) -> Result<UnsignedEnvelope, RotationError> {
        let chain_id = self.chain.chain_id().await.map_err(RotationError::registry)?;
        let gas_price = self.chain.gas_price().await.map_err(RotationError::registry)?;
        let account_nonce = self
            .chain
            .transaction_count(sender)
            .await
            .map_err(RotationError::registry)?;

        // The two strategies differ only in which counter goes into the signed object.
        let tx_nonce = match self.strategy {
            ExecutionStrategy::SafeExec => {
                OwnerRegistry::new(self.chain, self.safe).wallet_nonce().await?
            }
            ExecutionStrategy::DirectCall => account_nonce,
        };

        let domain = TxDomain {
            chain_id,
            safe: self.safe,
        };
        let tx = SafeTransaction::call(self.safe, call_data, tx_nonce);
        let gas = GasParams {
            gas_limit: U256::from(self.gas_limit),
            gas_price,
        };
        let hash = envelope_hash(self.strategy, &domain, &tx, sender, account_nonce, &gas);

        debug!(
            strategy = %self.strategy,
            chain_id,
            nonce = %tx.nonce,
            account_nonce = %account_nonce,
            hash = %hash,
            "built envelope"
        );

        Ok(UnsignedEnvelope {
            strategy: self.strategy,
            domain,
            tx,
            sender,
            account_nonce,
            gas,
            hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn domain() -> TxDomain {
        TxDomain {
            chain_id: 100,
            safe: Address::repeat_byte(0x5a),
        }
    }

    fn tx(nonce: u64) -> SafeTransaction {
        SafeTransaction::call(
            Address::repeat_byte(0x5a),
            Bytes::from(vec![0xe3, 0x18, 0xb5, 0x2b]),
            U256::from(nonce),
        )
    }

    #[test]
    fn type_hashes_match_safe_contract() {
        assert_eq!(
            hex::encode(keccak256_bytes(DOMAIN_SEPARATOR_TYPE)),
            "47e79534a245952e8b16893a336b85a3d9ea9fa8c573f3d803afb92a79469218"
        );
        assert_eq!(
            hex::encode(keccak256_bytes(SAFE_TX_TYPE)),
            "bb8310d486368db6bd6f849402fdd73ad53d316b5a4b2644ad6efe0f941286d8"
        );
    }

    #[test]
    fn safe_tx_hash_is_deterministic() {
        let a = safe_tx_hash(&domain(), &tx(3));
        let b = safe_tx_hash(&domain(), &tx(3));
        assert_eq!(a, b);
    }

    #[test]
    fn safe_tx_hash_binds_domain_and_nonce() {
        let base = safe_tx_hash(&domain(), &tx(3));
        assert_ne!(base, safe_tx_hash(&domain(), &tx(4)));
        assert_ne!(
            base,
            safe_tx_hash(
                &TxDomain {
                    chain_id: 1,
                    ..domain()
                },
                &tx(3)
            )
        );
        assert_ne!(
            base,
            safe_tx_hash(
                &TxDomain {
                    safe: Address::repeat_byte(0x5b),
                    ..domain()
                },
                &tx(3)
            )
        );
    }

    #[test]
    fn legacy_sighash_matches_eip155_example() {
        // Example transaction from EIP-155.
        let to = Address::from_str("0x3535353535353535353535353535353535353535").unwrap();
        let gas = GasParams {
            gas_limit: U256::from(21_000u64),
            gas_price: U256::from(20_000_000_000u64),
        };
        let mut outer = legacy_transaction(1, Address::ZERO, to, &Bytes::new(), U256::from(9u64), &gas);
        outer.set_value(ethers::types::U256::exp10(18));
        assert_eq!(
            hex::encode(from_h256(outer.sighash())),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn envelope_hash_dispatches_on_strategy() {
        let gas = GasParams {
            gas_limit: U256::from(200_000u64),
            gas_price: U256::from(1_000_000_000u64),
        };
        let sender = Address::repeat_byte(0x11);
        let safe_exec = envelope_hash(
            ExecutionStrategy::SafeExec,
            &domain(),
            &tx(3),
            sender,
            U256::from(8u64),
            &gas,
        );
        assert_eq!(safe_exec, safe_tx_hash(&domain(), &tx(3)));

        let direct = envelope_hash(
            ExecutionStrategy::DirectCall,
            &domain(),
            &tx(8),
            sender,
            U256::from(8u64),
            &gas,
        );
        assert_ne!(direct, safe_tx_hash(&domain(), &tx(8)));
        assert_eq!(
            direct,
            envelope_hash(
                ExecutionStrategy::DirectCall,
                &domain(),
                &tx(8),
                sender,
                U256::from(8u64),
                &gas,
            )
        );
    }
}
