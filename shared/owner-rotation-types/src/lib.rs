//! Shared types for Safe owner rotation: owner-list primitives and the chain boundary.

pub mod chain;
pub mod owners;

pub use chain::{CallRequest, ChainClient, ChainError};
pub use owners::{Operation, PendingSwap, SENTINEL};
