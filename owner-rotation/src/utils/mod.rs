//! Shared helpers for ABI words and hashing.

pub mod bytes;
pub mod crypto;
