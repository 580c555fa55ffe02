//! The owner-rotation pipeline.
//!
//! validate → resolve → encode → build → simulate → sign + broadcast. Each stage fails fast
//! with a typed error and nothing is retried. Concurrent rotations against the same Safe race
//! on nonces; callers running several must serialize them.

use alloy_primitives::Address;
use owner_rotation_types::{ChainClient, PendingSwap};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    address::validate_new_owner,
    builder::{TransactionBuilder, UnsignedEnvelope},
    config::{ExecutionStrategy, PipelineConfig},
    encoder::encode_swap_call,
    errors::RotationError,
    gate::{require_verified, Turn},
    resolver::OwnerRegistry,
    signer::TxSigner,
    simulator::simulate,
    submitter::{DirectCallSubmitter, SafeExecSubmitter, Submitter, TxId},
};

/// A swap that passed simulation but has not been signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedRotation {
    pub swap: PendingSwap,
    pub envelope: UnsignedEnvelope,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotationReceipt {
    pub swap: PendingSwap,
    pub tx_id: TxId,
}

pub struct RotationPipeline<C, S> {
    chain: C,
    signer: S,
    config: PipelineConfig,
}

impl<C: ChainClient, S: TxSigner> RotationPipeline<C, S> {
    pub fn new(chain: C, signer: S, config: PipelineConfig) -> Self {
        Self {
            chain,
            signer,
            config,
        }
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn agent(&self) -> Address {
        self.signer.address()
    }

    pub fn registry(&self) -> OwnerRegistry<'_, C> {
        OwnerRegistry::new(&self.chain, self.config.safe)
    }

    /// Everything up to and including the dry run. Produces no signature.
    pub async fn plan(&self, new_owner: &str) -> Result<PlannedRotation, RotationError> {
        let incoming = validate_new_owner(new_owner, self.config.safe)?;
        let swap = self.registry().resolve_swap(self.agent(), incoming).await?;
        let call_data = encode_swap_call(&swap)?;

        let envelope = TransactionBuilder::new(
            &self.chain,
            self.config.safe,
            self.config.strategy,
            self.config.gas_limit,
        )
        .build(self.agent(), call_data)
        .await?;

        simulate(&self.chain, &envelope).await?;
        Ok(PlannedRotation { swap, envelope })
    }

    /// Run the whole pipeline and return the broadcast transaction id.
    pub async fn rotate(&self, new_owner: &str) -> Result<RotationReceipt, RotationError> {
        let planned = self.plan(new_owner).await?;
        let tx_id = self.submitter().submit(&planned.envelope).await?;
        info!(
            safe = %self.config.safe,
            old = %planned.swap.outgoing,
            new = %planned.swap.incoming,
            tx = %tx_id,
            "owner rotation submitted"
        );
        Ok(RotationReceipt {
            swap: planned.swap,
            tx_id,
        })
    }

    /// Gate on the transcript first; a denial touches no chain state.
    pub async fn rotate_verified(
        &self,
        transcript: &[Turn],
        new_owner: &str,
    ) -> Result<RotationReceipt, RotationError> {
        require_verified(transcript)?;
        self.rotate(new_owner).await
    }

    /// Serve one inbound request. Gated when it carries a conversation.
    pub async fn handle(&self, request: &RotationRequest) -> RotationResponse {
        let result = match &request.conversation {
            Some(transcript) => self.rotate_verified(transcript, &request.new_address).await,
            None => self.rotate(&request.new_address).await,
        };
        match result {
            Ok(receipt) => RotationResponse::sent(receipt.tx_id),
            Err(err) => {
                warn!(kind = err.kind(), error = %err, "owner rotation failed");
                RotationResponse::failed(&err)
            }
        }
    }

    fn submitter(&self) -> Box<dyn Submitter + '_> {
        match self.config.strategy {
            ExecutionStrategy::SafeExec => Box::new(SafeExecSubmitter::new(&self.chain, &self.signer)),
            ExecutionStrategy::DirectCall => {
                Box::new(DirectCallSubmitter::new(&self.chain, &self.signer))
            }
        }
    }
}

/// Inbound request body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRequest {
    pub new_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Vec<Turn>>,
}

/// Outbound response body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RotationResponse {
    Sent { message: String, tx_hash: String },
    Failed { error: String, detail: String },
}

impl RotationResponse {
    pub fn sent(tx_id: TxId) -> Self {
        RotationResponse::Sent {
            message: "Switch owner transaction sent.".into(),
            tx_hash: tx_id.to_string(),
        }
    }

    pub fn failed(err: &RotationError) -> Self {
        RotationResponse::Failed {
            error: err.kind().into(),
            detail: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RotationResponse::Sent { .. })
    }
}
