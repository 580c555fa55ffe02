//! Safe owner rotation.
//!
//! Replaces the human co-owner of a Safe with a new address on behalf of the agent co-owner:
//! resolve the owner linked list, encode `swapOwner`, build and hash the wallet transaction,
//! dry-run it, then sign with the agent key and broadcast.

pub mod address;
pub mod builder;
pub mod config;
pub mod convert;
pub mod encoder;
pub mod errors;
pub mod gate;
pub mod mock;
pub mod pipeline;
pub mod resolver;
pub mod rpc;
pub mod safe;
pub mod signer;
pub mod simulator;
pub mod submitter;
pub mod utils;

#[cfg(test)]
mod tests;

pub use config::{ConfigError, ExecutionStrategy, PipelineConfig, RotationConfig};
pub use errors::RotationError;
pub use gate::{GateDecision, Role, Turn};
pub use pipeline::{RotationPipeline, RotationReceipt, RotationRequest, RotationResponse};
pub use signer::{AgentSigner, TxSigner};
pub use submitter::TxId;
