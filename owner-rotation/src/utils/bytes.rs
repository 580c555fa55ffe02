//! Minimal ABI word helpers.
//!
//! Addresses occupy the low 20 bytes of a 32-byte word; the high 12 bytes must be zero.

use alloy_primitives::{Address, U256};

use crate::errors::DecodeError;

pub fn write_address_word(buf: &mut Vec<u8>, addr: Address) {
    let mut word = [0u8; 32];
    word[12..32].copy_from_slice(addr.as_slice());
    buf.extend_from_slice(&word);
}

pub fn write_u256_word(buf: &mut Vec<u8>, value: U256) {
    buf.extend_from_slice(&value.to_be_bytes::<32>());
}

pub fn read_selector(bytes: &[u8], i: &mut usize) -> Result<[u8; 4], DecodeError> {
    if bytes.len() < *i + 4 {
        return Err(DecodeError::Truncated);
    }
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&bytes[*i..*i + 4]);
    *i += 4;
    Ok(sel)
}

pub fn read_address_word(bytes: &[u8], i: &mut usize) -> Result<Address, DecodeError> {
    if bytes.len() < *i + 32 {
        return Err(DecodeError::Truncated);
    }
    let word = &bytes[*i..*i + 32];
    if word[..12].iter().any(|b| *b != 0) {
        return Err(DecodeError::DirtyPadding);
    }
    let addr = Address::from_slice(&word[12..32]);
    *i += 32;
    Ok(addr)
}
