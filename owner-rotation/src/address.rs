//! Address parsing for values crossing the trust boundary.
//!
//! Lowercase and uppercase hex are accepted as-is. Mixed-case input must carry a valid
//! EIP-55 checksum. Addresses are always rendered checksummed.

use std::{collections::HashSet, str::FromStr, sync::LazyLock};

use alloy_primitives::Address;
use owner_rotation_types::SENTINEL;
use regex::Regex;

use crate::errors::RotationError;

static ADDRESS_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$"));

/// Parse an externally supplied address string.
pub fn parse_address(raw: &str) -> Result<Address, RotationError> {
    let s = raw.trim();
    let re = ADDRESS_RE
        .as_ref()
        .map_err(|e| RotationError::InvalidAddress(format!("address pattern: {e}")))?;
    if !re.is_match(s) {
        return Err(RotationError::InvalidAddress(format!(
            "{raw:?} is not a 0x-prefixed 20-byte hex address"
        )));
    }

    let body = &s[2..];
    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(s, None)
            .map_err(|_| RotationError::InvalidAddress(format!("{s} has a bad EIP-55 checksum")));
    }

    Address::from_str(s).map_err(|e| RotationError::InvalidAddress(format!("{s}: {e}")))
}

/// Parse an address that is about to become an owner of `safe`.
///
/// The Safe refuses the zero address, the sentinel and itself as owners.
pub fn validate_new_owner(raw: &str, safe: Address) -> Result<Address, RotationError> {
    let addr = parse_address(raw)?;
    if addr == Address::ZERO || addr == SENTINEL {
        return Err(RotationError::InvalidAddress(format!("{addr} is a reserved address")));
    }
    if addr == safe {
        return Err(RotationError::InvalidAddress(format!(
            "{addr} is the safe itself"
        )));
    }
    Ok(addr)
}

/// Checksummed display form.
pub fn checksummed(addr: Address) -> String {
    addr.to_checksum(None)
}

/// Sanity check an owner list read from chain before anything compares against it.
pub fn check_owner_list(owners: &[Address]) -> Result<(), RotationError> {
    let mut seen = HashSet::with_capacity(owners.len());
    for owner in owners {
        if *owner == Address::ZERO || *owner == SENTINEL {
            return Err(RotationError::RegistryUnavailable(format!(
                "malformed owner list: reserved address {owner}"
            )));
        }
        if !seen.insert(*owner) {
            return Err(RotationError::RegistryUnavailable(format!(
                "malformed owner list: duplicate owner {owner}"
            )));
        }
    }
    Ok(())
}
