//! Owner registry reads and swap planning.
//!
//! `getOwners()` walks the Safe's linked list from the sentinel, so the returned order is
//! the list order and adjacent entries are adjacent on chain.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use owner_rotation_types::{CallRequest, ChainClient, PendingSwap};
use tracing::{debug, info};

use crate::{address::check_owner_list, errors::RotationError, safe::ISafe};

/// Read-only view of a Safe's owner registry.
pub struct OwnerRegistry<'a, C> {
    chain: &'a C,
    safe: Address,
}

impl<'a, C: ChainClient> OwnerRegistry<'a, C> {
    pub fn new(chain: &'a C, safe: Address) -> Self {
        Self { chain, safe }
    }

    async fn read<T: SolCall>(&self, call: T) -> Result<T::Return, RotationError> {
        let request = CallRequest {
            from: None,
            to: self.safe,
            data: call.abi_encode().into(),
        };
        let out = self
            .chain
            .call(&request)
            .await
            .map_err(RotationError::registry)?;
        T::abi_decode_returns(&out, true).map_err(|e| {
            RotationError::RegistryUnavailable(format!("malformed {} return: {e}", T::SIGNATURE))
        })
    }

    /// Current owners in linked-list order.
    pub async fn owners(&self) -> Result<Vec<Address>, RotationError> {
        let owners = self.read(ISafe::getOwnersCall {}).await?._0;
        check_owner_list(&owners)?;
        Ok(owners)
    }

    /// Wallet-level execution nonce (not the account nonce of any signer).
    pub async fn wallet_nonce(&self) -> Result<U256, RotationError> {
        Ok(self.read(ISafe::nonceCall {}).await?._0)
    }

    pub async fn threshold(&self) -> Result<U256, RotationError> {
        Ok(self.read(ISafe::getThresholdCall {}).await?._0)
    }

    /// Read the live owner list and plan the replacement of the human owner by `incoming`.
    pub async fn resolve_swap(
        &self,
        agent: Address,
        incoming: Address,
    ) -> Result<PendingSwap, RotationError> {
        let owners = self.owners().await?;
        debug!(safe = %self.safe, count = owners.len(), "read owner set");
        let swap = plan_swap(&owners, agent, incoming)?;
        info!(
            prev = %swap.predecessor,
            old = %swap.outgoing,
            new = %swap.incoming,
            "resolved owner swap"
        );
        Ok(swap)
    }
}

/// Derive the swap replacing the first non-agent owner with `incoming`.
pub fn plan_swap(
    owners: &[Address],
    agent: Address,
    incoming: Address,
) -> Result<PendingSwap, RotationError> {
    if owners.len() < 2 {
        return Err(RotationError::InsufficientOwners {
            count: owners.len(),
        });
    }
    if !owners.contains(&agent) {
        return Err(RotationError::AgentNotOwner(agent));
    }

    let index = owners
        .iter()
        .position(|o| *o != agent)
        .ok_or(RotationError::NoHumanOwner)?;
    let outgoing = owners[index];
    let predecessor =
        PendingSwap::predecessor_of(owners, index).ok_or(RotationError::NoHumanOwner)?;

    if owners.contains(&incoming) {
        return Err(RotationError::AddressAlreadyOwner(incoming));
    }

    Ok(PendingSwap {
        predecessor,
        outgoing,
        incoming,
    })
}
