use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use alloy_primitives::{Address, B256, U256};
use owner_rotation_types::SENTINEL;
use secrecy::SecretString;

use crate::{
    builder::TransactionBuilder,
    config::{ExecutionStrategy, PipelineConfig},
    encoder::encode_swap_call,
    errors::RotationError,
    gate::{Role, Turn},
    mock::MockSafe,
    pipeline::{RotationPipeline, RotationRequest, RotationResponse},
    resolver::OwnerRegistry,
    signer::{AgentSigner, RecoverableSignature, TxSigner},
    simulator::simulate,
};

const AGENT_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
const NEW_OWNER: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

/// Counts signatures so tests can prove none were produced.
struct CountingSigner {
    inner: AgentSigner,
    count: AtomicUsize,
}

impl CountingSigner {
    fn new() -> Self {
        Self {
            inner: AgentSigner::from_hex(&SecretString::from(AGENT_KEY)).unwrap(),
            count: AtomicUsize::new(0),
        }
    }

    fn signatures(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl TxSigner for CountingSigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    fn sign_prehash(&self, hash: B256) -> Result<RecoverableSignature, RotationError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_prehash(hash)
    }
}

fn safe() -> Address {
    Address::repeat_byte(0x5a)
}

fn human() -> Address {
    Address::repeat_byte(0x77)
}

fn new_owner() -> Address {
    Address::from_str(NEW_OWNER).unwrap()
}

fn setup(
    owners: impl FnOnce(Address) -> Vec<Address>,
    strategy: ExecutionStrategy,
    signer: &CountingSigner,
) -> (Arc<MockSafe>, RotationPipeline<Arc<MockSafe>, &CountingSigner>) {
    let mock = Arc::new(MockSafe::new(safe(), owners(signer.address())));
    let config = PipelineConfig {
        strategy,
        ..PipelineConfig::new(safe())
    };
    let pipeline = RotationPipeline::new(mock.clone(), signer, config);
    (mock, pipeline)
}

#[tokio::test]
async fn safe_exec_replaces_human_listed_first() {
    let signer = CountingSigner::new();
    let (mock, pipeline) = setup(|agent| vec![human(), agent], ExecutionStrategy::SafeExec, &signer);

    let receipt = pipeline.rotate(NEW_OWNER).await.unwrap();
    assert_eq!(receipt.swap.predecessor, SENTINEL);
    assert_eq!(receipt.swap.outgoing, human());
    assert_eq!(receipt.swap.incoming, new_owner());

    let receipts = mock.receipts();
    assert_eq!(receipts.len(), 1);
    assert!(receipts[0].success, "{:?}", receipts[0].reason);
    assert_eq!(receipt.tx_id.0, receipts[0].hash);
    assert_eq!(receipts[0].from, signer.address());

    assert_eq!(mock.owners(), vec![new_owner(), signer.address()]);
    assert_eq!(mock.nonce(), U256::from(1u64));
    assert_eq!(mock.account_nonce(signer.address()), U256::from(1u64));
    // SafeTx hash + outer transaction.
    assert_eq!(signer.signatures(), 2);
}

#[tokio::test]
async fn safe_exec_replaces_human_listed_second() {
    let signer = CountingSigner::new();
    let (mock, pipeline) = setup(|agent| vec![agent, human()], ExecutionStrategy::SafeExec, &signer);

    let receipt = pipeline.rotate(NEW_OWNER).await.unwrap();
    assert_eq!(receipt.swap.predecessor, signer.address());
    assert_eq!(receipt.swap.outgoing, human());
    assert_eq!(mock.owners(), vec![signer.address(), new_owner()]);
}

#[tokio::test]
async fn consecutive_rotations_use_fresh_nonces() {
    let signer = CountingSigner::new();
    let (mock, pipeline) = setup(|agent| vec![agent, human()], ExecutionStrategy::SafeExec, &signer);
    mock.set_nonce(U256::from(41u64));

    pipeline.rotate(NEW_OWNER).await.unwrap();
    let second = "0x00000000000000000000000000000000000000aa";
    let receipt = pipeline.rotate(second).await.unwrap();
    assert_eq!(receipt.swap.outgoing, new_owner());

    assert_eq!(mock.nonce(), U256::from(43u64));
    assert_eq!(mock.account_nonce(signer.address()), U256::from(2u64));
    assert!(mock.receipts().iter().all(|r| r.success));
}

#[tokio::test]
async fn direct_call_uses_account_nonce() {
    let signer = CountingSigner::new();
    let (mock, pipeline) = setup(|agent| vec![human(), agent], ExecutionStrategy::DirectCall, &signer);
    mock.allow_direct_caller(signer.address());

    let planned = pipeline.plan(NEW_OWNER).await.unwrap();
    assert_eq!(planned.envelope.tx.nonce, U256::ZERO);
    assert_eq!(planned.envelope.tx.nonce, planned.envelope.account_nonce);
    assert_eq!(signer.signatures(), 0);

    pipeline.rotate(NEW_OWNER).await.unwrap();
    assert_eq!(mock.owners(), vec![new_owner(), signer.address()]);
    assert_eq!(mock.nonce(), U256::ZERO);
    assert_eq!(mock.account_nonce(signer.address()), U256::from(1u64));
    assert_eq!(signer.signatures(), 1);
}

#[tokio::test]
async fn failed_simulation_never_signs() {
    let signer = CountingSigner::new();
    // Safe only accepts swapOwner from itself.
    let (mock, pipeline) = setup(|agent| vec![human(), agent], ExecutionStrategy::DirectCall, &signer);

    let err = pipeline.rotate(NEW_OWNER).await.unwrap_err();
    assert_eq!(err, RotationError::SimulationFailed("GS031".into()));
    assert_eq!(signer.signatures(), 0);
    assert!(mock.receipts().is_empty());
    assert_eq!(mock.owners(), vec![human(), signer.address()]);
}

#[tokio::test]
async fn owner_set_change_after_resolution_is_caught() {
    let signer = CountingSigner::new();
    let (mock, _) = setup(|agent| vec![human(), agent], ExecutionStrategy::SafeExec, &signer);

    let registry = OwnerRegistry::new(&mock, safe());
    let swap = registry.resolve_swap(signer.address(), new_owner()).await.unwrap();
    let envelope = TransactionBuilder::new(&mock, safe(), ExecutionStrategy::SafeExec, 200_000)
        .build(signer.address(), encode_swap_call(&swap).unwrap())
        .await
        .unwrap();

    // Someone inserts an owner ahead of the human before we simulate.
    mock.set_owners(vec![Address::repeat_byte(0x99), human(), signer.address()]);
    let err = simulate(&mock, &envelope).await.unwrap_err();
    assert_eq!(err.kind(), "simulation_failed");
    assert_eq!(signer.signatures(), 0);
}

#[tokio::test]
async fn multi_signature_threshold_fails_in_simulation() {
    let signer = CountingSigner::new();
    let (mock, pipeline) = setup(|agent| vec![human(), agent], ExecutionStrategy::SafeExec, &signer);
    mock.set_threshold(2);

    let err = pipeline.rotate(NEW_OWNER).await.unwrap_err();
    assert_eq!(err, RotationError::SimulationFailed("GS020".into()));
    assert_eq!(signer.signatures(), 0);
}

#[tokio::test]
async fn new_owner_already_present() {
    let signer = CountingSigner::new();
    let other = Address::repeat_byte(0x33);
    let (mock, pipeline) = setup(
        |agent| vec![human(), agent, other],
        ExecutionStrategy::SafeExec,
        &signer,
    );

    let err = pipeline.rotate(&other.to_checksum(None)).await.unwrap_err();
    assert_eq!(err, RotationError::AddressAlreadyOwner(other));
    assert!(mock.receipts().is_empty());
    // Only the owner read happened; nothing was built or simulated.
    assert_eq!(mock.calls().len(), 1);
}

#[tokio::test]
async fn registry_preconditions_stop_before_any_write() {
    let signer = CountingSigner::new();

    let (mock, pipeline) = setup(|agent| vec![agent], ExecutionStrategy::SafeExec, &signer);
    assert_eq!(
        pipeline.rotate(NEW_OWNER).await.unwrap_err(),
        RotationError::InsufficientOwners { count: 1 }
    );
    assert!(mock.receipts().is_empty());

    let (mock, pipeline) = setup(
        |_| vec![human(), Address::repeat_byte(0x78)],
        ExecutionStrategy::SafeExec,
        &signer,
    );
    assert_eq!(
        pipeline.rotate(NEW_OWNER).await.unwrap_err(),
        RotationError::AgentNotOwner(signer.address())
    );
    assert!(mock.receipts().is_empty());
    assert_eq!(signer.signatures(), 0);
}

#[tokio::test]
async fn unreachable_registry() {
    let signer = CountingSigner::new();
    let (mock, pipeline) = setup(|agent| vec![human(), agent], ExecutionStrategy::SafeExec, &signer);
    mock.set_fail_reads(true);

    let err = pipeline.rotate(NEW_OWNER).await.unwrap_err();
    assert!(matches!(err, RotationError::RegistryUnavailable(_)));
}

#[tokio::test]
async fn broadcast_failure_leaves_state_untouched() {
    let signer = CountingSigner::new();
    let (mock, pipeline) = setup(|agent| vec![human(), agent], ExecutionStrategy::SafeExec, &signer);
    mock.set_fail_broadcast(true);

    let err = pipeline.rotate(NEW_OWNER).await.unwrap_err();
    assert!(matches!(err, RotationError::BroadcastFailed(_)));
    assert!(mock.receipts().is_empty());
    assert_eq!(mock.owners(), vec![human(), signer.address()]);
    assert_eq!(mock.account_nonce(signer.address()), U256::ZERO);
}

#[tokio::test]
async fn invalid_new_owner_is_rejected_before_chain_access() {
    let signer = CountingSigner::new();
    let (mock, pipeline) = setup(|agent| vec![human(), agent], ExecutionStrategy::SafeExec, &signer);

    for raw in ["0x1234", "0x0000000000000000000000000000000000000001", "not an address"] {
        let err = pipeline.rotate(raw).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_address");
    }
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn plan_is_reproducible() {
    let signer = CountingSigner::new();
    let (_mock, pipeline) = setup(|agent| vec![human(), agent], ExecutionStrategy::SafeExec, &signer);

    let a = pipeline.plan(NEW_OWNER).await.unwrap();
    let b = pipeline.plan(NEW_OWNER).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(signer.signatures(), 0);
}

#[tokio::test]
async fn gate_denial_touches_no_chain_state() {
    let signer = CountingSigner::new();
    let (mock, pipeline) = setup(|agent| vec![human(), agent], ExecutionStrategy::SafeExec, &signer);

    let transcript = [Turn::new(Role::Agent, "please tell me more")];
    let err = pipeline.rotate_verified(&transcript, NEW_OWNER).await.unwrap_err();
    assert_eq!(err, RotationError::Unauthorized);
    assert!(mock.calls().is_empty());
    assert!(mock.receipts().is_empty());
}

#[tokio::test]
async fn verified_conversation_rotates() {
    let signer = CountingSigner::new();
    let (mock, pipeline) = setup(|agent| vec![human(), agent], ExecutionStrategy::SafeExec, &signer);

    let transcript = [
        Turn::new(Role::User, "my name is Alice"),
        Turn::new(Role::Agent, "Verified"),
    ];
    pipeline.rotate_verified(&transcript, NEW_OWNER).await.unwrap();
    assert_eq!(mock.owners()[0], new_owner());
}

#[tokio::test]
async fn handle_maps_outcomes_to_responses() {
    let signer = CountingSigner::new();
    let (_mock, pipeline) = setup(|agent| vec![human(), agent], ExecutionStrategy::SafeExec, &signer);

    let request: RotationRequest = serde_json::from_str(&format!(
        r#"{{"new_address": "{NEW_OWNER}", "conversation": [{{"role": "assistant", "text": "verified!"}}]}}"#
    ))
    .unwrap();
    let response = pipeline.handle(&request).await;
    assert!(response.is_success());
    let json = serde_json::to_value(&response).unwrap();
    assert!(json["tx_hash"].as_str().unwrap().starts_with("0x"));

    let request = RotationRequest {
        new_address: NEW_OWNER.into(),
        conversation: Some(vec![]),
    };
    let response = pipeline.handle(&request).await;
    assert_eq!(
        response,
        RotationResponse::Failed {
            error: "unauthorized".into(),
            detail: RotationError::Unauthorized.to_string(),
        }
    );

    let request = RotationRequest {
        new_address: "0xnope".into(),
        conversation: None,
    };
    let json = serde_json::to_value(pipeline.handle(&request).await).unwrap();
    assert_eq!(json["error"], "invalid_address");
}
