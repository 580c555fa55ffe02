//! Owner-swap call encoding.
//!
//! Layout: `selector || prevOwner || oldOwner || newOwner`, each address in a 32-byte word.

use alloy_primitives::{Address, Bytes};
use owner_rotation_types::{PendingSwap, SENTINEL};

use crate::{
    errors::{DecodeError, RotationError},
    utils::{
        bytes::{read_address_word, read_selector, write_address_word},
        crypto::selector,
    },
};

pub const SWAP_OWNER_SIGNATURE: &str = "swapOwner(address,address,address)";

const SWAP_CALL_LEN: usize = 4 + 32 * 3;

pub fn swap_owner_selector() -> [u8; 4] {
    selector(SWAP_OWNER_SIGNATURE)
}

/// Encode the `swapOwner(prev, old, new)` call for a resolved swap.
pub fn encode_swap_call(swap: &PendingSwap) -> Result<Bytes, RotationError> {
    let reserved = |a: Address| a == Address::ZERO || a == SENTINEL;
    if reserved(swap.outgoing) || reserved(swap.incoming) {
        return Err(RotationError::InvalidAddress(format!(
            "swap references a reserved address: {} -> {}",
            swap.outgoing, swap.incoming
        )));
    }
    if swap.predecessor == swap.outgoing || swap.incoming == swap.outgoing {
        return Err(RotationError::InvalidAddress(format!(
            "inconsistent swap: prev {}, old {}, new {}",
            swap.predecessor, swap.outgoing, swap.incoming
        )));
    }

    let mut buf = Vec::with_capacity(SWAP_CALL_LEN);
    buf.extend_from_slice(&swap_owner_selector());
    write_address_word(&mut buf, swap.predecessor);
    write_address_word(&mut buf, swap.outgoing);
    write_address_word(&mut buf, swap.incoming);
    Ok(Bytes::from(buf))
}

/// Decode `swapOwner` call data back into its triple. Rejects anything not produced by
/// [`encode_swap_call`].
pub fn decode_swap_call(data: &[u8]) -> Result<PendingSwap, DecodeError> {
    let mut i = 0usize;
    let sel = read_selector(data, &mut i)?;
    if sel != swap_owner_selector() {
        return Err(DecodeError::UnknownSelector(sel));
    }
    let predecessor = read_address_word(data, &mut i)?;
    let outgoing = read_address_word(data, &mut i)?;
    let incoming = read_address_word(data, &mut i)?;
    if i != data.len() {
        return Err(DecodeError::TrailingBytes);
    }
    Ok(PendingSwap {
        predecessor,
        outgoing,
        incoming,
    })
}
