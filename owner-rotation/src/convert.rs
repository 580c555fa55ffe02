//! Conversions between alloy primitives and the ethers transport types.

use alloy_primitives::{Address, Bytes, B256, U256};
use ethers::types::{Bytes as EthersBytes, H160, H256, U256 as EthersU256};

pub fn to_h160(addr: Address) -> H160 {
    H160::from_slice(addr.as_slice())
}

pub fn from_h160(addr: H160) -> Address {
    Address::from_slice(addr.as_bytes())
}

pub fn to_ethers_u256(value: U256) -> EthersU256 {
    EthersU256::from_big_endian(&value.to_be_bytes::<32>())
}

pub fn from_ethers_u256(value: EthersU256) -> U256 {
    U256::from_limbs(value.0)
}

pub fn from_h256(hash: H256) -> B256 {
    B256::from_slice(hash.as_bytes())
}

pub fn to_ethers_bytes(data: &Bytes) -> EthersBytes {
    EthersBytes::from(data.to_vec())
}

pub fn from_ethers_bytes(data: EthersBytes) -> Bytes {
    Bytes::from(data.to_vec())
}
