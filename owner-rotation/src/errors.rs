use alloy_primitives::Address;
use owner_rotation_types::ChainError;

/// Errors while decoding owner-swap call data.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown selector 0x{}", hex::encode(.0))]
    UnknownSelector([u8; 4]),
    #[error("truncated call data")]
    Truncated,
    #[error("trailing bytes after call data")]
    TrailingBytes,
    #[error("address word has non-zero padding")]
    DirtyPadding,
}

/// Pipeline failures. Every stage reports exactly one of these kinds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RotationError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("owner set has {count} entries, at least 2 are required")]
    InsufficientOwners { count: usize },
    #[error("agent {0} is not an owner of the safe")]
    AgentNotOwner(Address),
    #[error("safe has no owner other than the agent")]
    NoHumanOwner,
    #[error("{0} is already an owner of the safe")]
    AddressAlreadyOwner(Address),
    #[error("owner registry unavailable: {0}")]
    RegistryUnavailable(String),
    #[error("simulation failed: {0}")]
    SimulationFailed(String),
    #[error("signing failed: {0}")]
    SigningFailed(String),
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),
    #[error("conversation has not verified the requester")]
    Unauthorized,
}

impl RotationError {
    /// Stable machine-readable kind for responses.
    pub fn kind(&self) -> &'static str {
        match self {
            RotationError::InvalidAddress(_) => "invalid_address",
            RotationError::InsufficientOwners { .. } => "insufficient_owners",
            RotationError::AgentNotOwner(_) => "agent_not_owner",
            RotationError::NoHumanOwner => "no_human_owner",
            RotationError::AddressAlreadyOwner(_) => "address_already_owner",
            RotationError::RegistryUnavailable(_) => "registry_unavailable",
            RotationError::SimulationFailed(_) => "simulation_failed",
            RotationError::SigningFailed(_) => "signing_failed",
            RotationError::BroadcastFailed(_) => "broadcast_failed",
            RotationError::Unauthorized => "unauthorized",
        }
    }

    pub(crate) fn registry(err: ChainError) -> Self {
        RotationError::RegistryUnavailable(err.to_string())
    }

    pub(crate) fn simulation(err: ChainError) -> Self {
        match err {
            ChainError::Rejected { reason } => RotationError::SimulationFailed(reason),
            other => RotationError::SimulationFailed(other.to_string()),
        }
    }

    pub(crate) fn broadcast(err: ChainError) -> Self {
        RotationError::BroadcastFailed(err.to_string())
    }
}
