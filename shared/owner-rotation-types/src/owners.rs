use alloy_primitives::{address, Address};

/// Head of the Safe owner linked list.
pub const SENTINEL: Address = address!("0000000000000000000000000000000000000001");

/// Safe transaction operation kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    Call = 0x00,
    DelegateCall = 0x01,
}

impl TryFrom<u8> for Operation {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let op = match value {
            0x00 => Operation::Call,
            0x01 => Operation::DelegateCall,
            _ => return Err(()),
        };
        Ok(op)
    }
}

/// Owner replacement derived from the live owner list.
///
/// `predecessor` must point at `outgoing` in the on-chain list when the swap executes,
/// and `incoming` must not already be an owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingSwap {
    pub predecessor: Address,
    pub outgoing: Address,
    pub incoming: Address,
}

impl PendingSwap {
    /// Predecessor of the entry at `index` in an ordered owner list.
    pub fn predecessor_of(owners: &[Address], index: usize) -> Option<Address> {
        match index {
            0 if !owners.is_empty() => Some(SENTINEL),
            i if i < owners.len() => Some(owners[i - 1]),
            _ => None,
        }
    }
}
