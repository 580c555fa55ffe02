//! Agent key handling and signature production.
//!
//! The key is loaded once at startup and only read afterwards; signing is a pure function
//! of (key, digest), so a shared `AgentSigner` needs no locking.

use std::fmt;

use alloy_primitives::{Address, Bytes, B256};
use ethers::types::{transaction::eip2718::TypedTransaction, Signature as EthersSignature, U256 as EthersU256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use secrecy::{ExposeSecret, SecretString};

use crate::{
    config::ConfigError,
    convert::{from_ethers_bytes, from_h256},
    errors::RotationError,
    utils::crypto::address_of,
};

/// secp256k1 signature with its recovery id (0 or 1).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: B256,
    pub s: B256,
    pub recovery_id: u8,
}

impl RecoverableSignature {
    /// `r || s || v` with `v = 27 + recovery id`, the form the Safe verifies with `ecrecover`.
    pub fn to_safe_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(self.r.as_slice());
        out[32..64].copy_from_slice(self.s.as_slice());
        out[64] = 27 + self.recovery_id;
        out
    }

    /// Parse `r || s || v`, accepting `v` in {0, 1, 27, 28}.
    pub fn from_safe_bytes(sig: &[u8]) -> Option<Self> {
        if sig.len() != 65 {
            return None;
        }
        let recovery_id = match sig[64] {
            v @ (0 | 1) => v,
            v @ (27 | 28) => v - 27,
            _ => return None,
        };
        Some(Self {
            r: B256::from_slice(&sig[..32]),
            s: B256::from_slice(&sig[32..64]),
            recovery_id,
        })
    }

    /// EIP-155 signature for a legacy transaction on `chain_id`.
    pub fn to_eip155(&self, chain_id: u64) -> Result<EthersSignature, RotationError> {
        let v = chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35 + u64::from(self.recovery_id)))
            .ok_or_else(|| {
                RotationError::SigningFailed(format!("chain id {chain_id} overflows EIP-155 v"))
            })?;
        Ok(EthersSignature {
            r: EthersU256::from_big_endian(self.r.as_slice()),
            s: EthersU256::from_big_endian(self.s.as_slice()),
            v,
        })
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoverableSignature")
            .field("recovery_id", &self.recovery_id)
            .finish_non_exhaustive()
    }
}

/// Something that can sign 32-byte digests on behalf of one account.
pub trait TxSigner: Send + Sync {
    fn address(&self) -> Address;

    fn sign_prehash(&self, hash: B256) -> Result<RecoverableSignature, RotationError>;
}

/// The agent's secp256k1 key.
pub struct AgentSigner {
    key: SigningKey,
    address: Address,
}

impl AgentSigner {
    pub fn new(key: SigningKey) -> Self {
        let address = address_of(key.verifying_key());
        Self { key, address }
    }

    /// Parse a hex private key (with or without `0x`).
    pub fn from_hex(secret: &SecretString) -> Result<Self, ConfigError> {
        let raw = secret.expose_secret().trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(raw).map_err(|_| ConfigError::InvalidKey("not hex".into()))?;
        if bytes.len() != 32 {
            return Err(ConfigError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = SigningKey::from_slice(&bytes)
            .map_err(|_| ConfigError::InvalidKey("not a valid secp256k1 scalar".into()))?;
        Ok(Self::new(key))
    }
}

impl fmt::Debug for AgentSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl TxSigner for AgentSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_prehash(&self, hash: B256) -> Result<RecoverableSignature, RotationError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| RotationError::SigningFailed(e.to_string()))?;
        let (r, s) = signature.split_bytes();
        Ok(RecoverableSignature {
            r: B256::from_slice(r.as_slice()),
            s: B256::from_slice(s.as_slice()),
            recovery_id: recovery_id.to_byte(),
        })
    }
}

impl<T: TxSigner + ?Sized> TxSigner for &T {
    fn address(&self) -> Address {
        (**self).address()
    }

    fn sign_prehash(&self, hash: B256) -> Result<RecoverableSignature, RotationError> {
        (**self).sign_prehash(hash)
    }
}

/// Recover the signing account of `hash`.
pub fn recover_signer(hash: B256, sig: &RecoverableSignature) -> Option<Address> {
    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(sig.r.as_slice());
    rs[32..].copy_from_slice(sig.s.as_slice());
    let signature = Signature::from_slice(&rs).ok()?;
    let recovery_id = RecoveryId::from_byte(sig.recovery_id)?;
    let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id).ok()?;
    Some(address_of(&key))
}

/// Sign a legacy transaction and return its RLP encoding, ready for broadcast.
pub fn sign_legacy<S: TxSigner + ?Sized>(
    signer: &S,
    tx: &TypedTransaction,
    chain_id: u64,
) -> Result<Bytes, RotationError> {
    let sighash = from_h256(tx.sighash());
    let sig = signer.sign_prehash(sighash)?;
    let sig = sig.to_eip155(chain_id)?;
    Ok(from_ethers_bytes(tx.rlp_signed(&sig)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{legacy_transaction, GasParams};
    use alloy_primitives::U256;
    use ethers::utils::rlp::Rlp;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn signer() -> AgentSigner {
        AgentSigner::from_hex(&SecretString::from(KEY)).unwrap()
    }

    #[test]
    fn derives_known_addresses() {
        assert_eq!(
            signer().address().to_checksum(None),
            "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"
        );
        let one = AgentSigner::from_hex(&SecretString::from(
            "0000000000000000000000000000000000000000000000000000000000000001",
        ))
        .unwrap();
        assert_eq!(
            one.address().to_checksum(None),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(AgentSigner::from_hex(&SecretString::from("0x1234")).is_err());
        assert!(AgentSigner::from_hex(&SecretString::from("zz")).is_err());
        assert!(AgentSigner::from_hex(&SecretString::from(
            "0x0000000000000000000000000000000000000000000000000000000000000000"
        ))
        .is_err());
    }

    #[test]
    fn debug_hides_key() {
        let rendered = format!("{:?}", signer());
        assert!(!rendered.contains("4c0883a6"));
        assert!(rendered.contains("address"));
    }

    #[test]
    fn signature_recovers_to_signer() {
        let s = signer();
        let hash = B256::repeat_byte(0x42);
        let sig = s.sign_prehash(hash).unwrap();
        assert_eq!(recover_signer(hash, &sig), Some(s.address()));

        let bytes = sig.to_safe_bytes();
        assert!(bytes[64] == 27 || bytes[64] == 28);
        assert_eq!(RecoverableSignature::from_safe_bytes(&bytes), Some(sig));
    }

    #[test]
    fn signing_is_deterministic() {
        let hash = B256::repeat_byte(0x07);
        assert_eq!(signer().sign_prehash(hash).unwrap(), signer().sign_prehash(hash).unwrap());
    }

    #[test]
    fn signed_legacy_transaction_decodes_with_sender() {
        let s = signer();
        let gas = GasParams {
            gas_limit: U256::from(200_000u64),
            gas_price: U256::from(1_000_000_000u64),
        };
        let tx = legacy_transaction(
            100,
            s.address(),
            Address::repeat_byte(0x5a),
            &Bytes::from(vec![1, 2, 3]),
            U256::from(4u64),
            &gas,
        );
        let raw = sign_legacy(&s, &tx, 100).unwrap();

        let rlp = Rlp::new(&raw);
        let (decoded, sig) = TypedTransaction::decode_signed(&rlp).unwrap();
        assert!(sig.v == 235 || sig.v == 236);
        let from = sig.recover(decoded.sighash()).unwrap();
        assert_eq!(crate::convert::from_h160(from), s.address());
    }

    #[test]
    fn eip155_v_overflow_is_a_signing_error() {
        let sig = signer().sign_prehash(B256::repeat_byte(0x01)).unwrap();
        assert!(sig.to_eip155(100).is_ok());
        let err = sig.to_eip155(u64::MAX / 2 + 1).unwrap_err();
        assert_eq!(err.kind(), "signing_failed");
    }
}
