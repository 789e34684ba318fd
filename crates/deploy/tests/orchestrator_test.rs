//! Orchestrator tests against a scripted ledger.
//!
//! The ledger records every deployment request and answers from a queue, so
//! these tests check ordering and failure handling without a node.
//! Run with: cargo test --test orchestrator_test

use std::{collections::VecDeque, future::Future, sync::Mutex, time::Duration};

use alloy_core::primitives::{Address, B256, U256, address};
use tokensale_deploy::{
    ContractArtifact, ContractDeployer, CrowdsaleArgs, DeployError, DeployRequest,
    DeployedArtifact, DeploymentOutcome, DeploymentParameters, NetworkProfile, NetworkRegistry,
    ResumeFrom, RunState, SaleArtifacts, SaleOrchestrator, TxOptions,
    network::{DEVELOPMENT, ROPSTEN, ROPSTEN_GAS},
};

const NOW: u64 = 1_526_000_000;

const TOKEN_ADDRESS: Address = address!("00000000000000000000000000000000000070c1");
const SALE_ADDRESS: Address = address!("0000000000000000000000000000000000005a1e");

/// A deployment request as seen by the ledger.
#[derive(Debug, Clone)]
struct RecordedCall {
    artifact: String,
    constructor_args: Vec<u8>,
    options: TxOptions,
}

/// Ledger that records requests and answers from a queue of scripted results.
#[derive(Default)]
struct ScriptedLedger {
    calls: Mutex<Vec<RecordedCall>>,
    responses: Mutex<VecDeque<Result<Address, DeployError>>>,
}

impl ScriptedLedger {
    fn new(responses: impl IntoIterator<Item = Result<Address, DeployError>>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl ContractDeployer for ScriptedLedger {
    fn deploy<'a>(
        &'a self,
        request: DeployRequest<'a>,
    ) -> impl Future<Output = Result<DeployedArtifact, DeployError>> + Send + 'a {
        self.calls.lock().unwrap().push(RecordedCall {
            artifact: request.artifact.name.clone(),
            constructor_args: request.constructor_args.to_vec(),
            options: request.options,
        });

        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("ledger called more often than scripted");

        let result = response.map(|address| DeployedArtifact {
            name: request.artifact.name.clone(),
            address,
            tx_hash: Some(B256::repeat_byte(0xab)),
            block_number: Some(1),
            gas_used: Some(21_000),
        });
        std::future::ready(result)
    }
}

fn params() -> DeploymentParameters {
    DeploymentParameters {
        beneficiary: address!("64293d503191BB5298cD15B64D733CFF5151a683"),
        opening_time: 1_526_403_600,
        closing_time: 1_526_774_400,
        rate: 10,
        goal: U256::from(4_000_000_000_000_000_000u128),
        cap: U256::from(50_000_000_000_000_000_000u128),
        gas_price: 50_000_000_000,
    }
}

fn crowdsale_artifact() -> ContractArtifact {
    ContractArtifact::from_json("DemoCrowdsale", r#"{"bytecode": {"object": "0x60806040"}}"#)
        .expect("crowdsale artifact is valid")
}

fn artifacts() -> SaleArtifacts {
    SaleArtifacts::new(
        ContractArtifact::from_json("DMT", r#"{"bytecode": "0x6080604052"}"#)
            .expect("token artifact is valid"),
        crowdsale_artifact(),
    )
}

fn profile(name: &str) -> NetworkProfile {
    NetworkRegistry::with_defaults()
        .profile(name)
        .expect("default profile exists")
        .clone()
}

fn network_error() -> DeployError {
    DeployError::Network {
        context: "deploying DMT".into(),
        message: "connection refused".into(),
    }
}

fn expected_crowdsale_args(token: Address) -> Vec<u8> {
    let validated = params().validate(NOW).expect("sample parameters are valid");
    CrowdsaleArgs::new(&validated, token).abi_encode().to_vec()
}

#[tokio::test]
async fn test_deploys_token_then_crowdsale() {
    let ledger = ScriptedLedger::new([Ok(TOKEN_ADDRESS), Ok(SALE_ADDRESS)]);
    let profile = profile(DEVELOPMENT);
    let mut orchestrator = SaleOrchestrator::new(&ledger, &profile, params(), artifacts());

    let outcome = orchestrator.run_at(NOW).await;

    let DeploymentOutcome::Complete { token, crowdsale } = &outcome else {
        panic!("expected a complete outcome, got {outcome:?}");
    };
    assert_eq!(token.address, TOKEN_ADDRESS);
    assert_eq!(crowdsale.address, SALE_ADDRESS);
    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.error().is_none());

    let calls = ledger.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].artifact, "DMT");
    assert!(calls[0].constructor_args.is_empty());
    assert_eq!(calls[1].artifact, "DemoCrowdsale");
    assert_eq!(calls[1].constructor_args, expected_crowdsale_args(TOKEN_ADDRESS));
    // Second constructor word is the token address.
    assert_eq!(&calls[1].constructor_args[44..64], TOKEN_ADDRESS.as_slice());

    assert_eq!(orchestrator.state(), RunState::Complete);
    assert_eq!(
        orchestrator.history(),
        &[
            RunState::NotStarted,
            RunState::TokenDeploying,
            RunState::TokenDeployed,
            RunState::CrowdsaleDeploying,
            RunState::Complete,
        ]
    );
    assert_eq!(orchestrator.deployed().len(), 2);
}

#[tokio::test]
async fn test_token_failure_never_attempts_crowdsale() {
    let ledger = ScriptedLedger::new([Err(network_error())]);
    let profile = profile(DEVELOPMENT);
    let mut orchestrator = SaleOrchestrator::new(&ledger, &profile, params(), artifacts());

    let outcome = orchestrator.run_at(NOW).await;

    assert!(matches!(
        outcome,
        DeploymentOutcome::Failed {
            error: DeployError::Network { .. }
        }
    ));
    assert_eq!(outcome.exit_code(), 1);
    assert!(outcome.token().is_none());

    let calls = ledger.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].artifact, "DMT");
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert!(orchestrator.deployed().is_empty());
}

#[tokio::test]
async fn test_crowdsale_failure_reports_live_token() {
    let ledger = ScriptedLedger::new([
        Ok(TOKEN_ADDRESS),
        Err(DeployError::TransactionRejected {
            artifact: "DemoCrowdsale".into(),
            reason: "out of gas".into(),
        }),
    ]);
    let profile = profile(DEVELOPMENT);
    let mut orchestrator = SaleOrchestrator::new(&ledger, &profile, params(), artifacts());

    let outcome = orchestrator.run_at(NOW).await;

    let DeploymentOutcome::PartiallyComplete { token, error } = &outcome else {
        panic!("expected a partial outcome, got {outcome:?}");
    };
    assert_eq!(token.address, TOKEN_ADDRESS);
    assert!(error.to_string().contains("DemoCrowdsale"));
    assert_eq!(outcome.exit_code(), 2);
    assert!(outcome.crowdsale().is_none());

    assert_eq!(ledger.calls().len(), 2);
    assert_eq!(orchestrator.state(), RunState::PartiallyComplete);
}

#[tokio::test]
async fn test_crowdsale_timeout_is_partial() {
    let ledger = ScriptedLedger::new([
        Ok(TOKEN_ADDRESS),
        Err(DeployError::Timeout {
            artifact: "DemoCrowdsale".into(),
            tx_hash: B256::repeat_byte(0x01),
            waited: Duration::from_secs(600),
            last_error: None,
        }),
    ]);
    let profile = profile(DEVELOPMENT);
    let mut orchestrator = SaleOrchestrator::new(&ledger, &profile, params(), artifacts());

    let outcome = orchestrator.run_at(NOW).await;

    assert_eq!(outcome.state(), RunState::PartiallyComplete);
    assert_eq!(outcome.token().map(|t| t.address), Some(TOKEN_ADDRESS));
    assert!(matches!(outcome.error(), Some(DeployError::Timeout { .. })));
}

#[tokio::test]
async fn test_invalid_parameters_make_no_ledger_calls() {
    let ledger = ScriptedLedger::default();
    let profile = profile(DEVELOPMENT);
    let invalid = DeploymentParameters {
        opening_time: 1_526_774_401,
        ..params()
    };
    let mut orchestrator = SaleOrchestrator::new(&ledger, &profile, invalid, artifacts());

    let outcome = orchestrator.run_at(NOW).await;

    assert!(matches!(
        outcome,
        DeploymentOutcome::Failed {
            error: DeployError::Parameter(_)
        }
    ));
    assert!(ledger.calls().is_empty());
    assert_eq!(
        orchestrator.history(),
        &[RunState::NotStarted, RunState::Failed]
    );
}

#[tokio::test]
async fn test_resume_with_existing_token_deploys_only_crowdsale() {
    let ledger = ScriptedLedger::new([Ok(SALE_ADDRESS)]);
    let profile = profile(DEVELOPMENT);
    let mut orchestrator = SaleOrchestrator::new(&ledger, &profile, params(), artifacts());

    let outcome = orchestrator
        .resume(ResumeFrom::ExistingToken(TOKEN_ADDRESS), NOW)
        .await;

    assert_eq!(outcome.state(), RunState::Complete);
    assert_eq!(outcome.token().map(|t| t.address), Some(TOKEN_ADDRESS));
    assert!(outcome.token().is_some_and(|t| t.tx_hash.is_none()));
    assert_eq!(outcome.crowdsale().map(|c| c.address), Some(SALE_ADDRESS));

    let calls = ledger.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].artifact, "DemoCrowdsale");
    assert_eq!(calls[0].constructor_args, expected_crowdsale_args(TOKEN_ADDRESS));
    assert_eq!(
        orchestrator.history(),
        &[
            RunState::NotStarted,
            RunState::TokenDeployed,
            RunState::CrowdsaleDeploying,
            RunState::Complete,
        ]
    );
}

#[tokio::test]
async fn test_resume_with_zero_token_is_rejected() {
    let ledger = ScriptedLedger::default();
    let profile = profile(DEVELOPMENT);
    let mut orchestrator = SaleOrchestrator::new(&ledger, &profile, params(), artifacts());

    let outcome = orchestrator
        .resume(ResumeFrom::ExistingToken(Address::ZERO), NOW)
        .await;

    assert!(matches!(outcome.error(), Some(DeployError::Parameter(_))));
    assert!(ledger.calls().is_empty());
}

#[tokio::test]
async fn test_resume_with_fresh_token_runs_both_steps() {
    let ledger = ScriptedLedger::new([Ok(TOKEN_ADDRESS), Ok(SALE_ADDRESS)]);
    let profile = profile(DEVELOPMENT);
    let mut orchestrator = SaleOrchestrator::new(&ledger, &profile, params(), artifacts());

    let outcome = orchestrator.resume(ResumeFrom::FreshToken, NOW).await;

    assert_eq!(outcome.state(), RunState::Complete);
    let names: Vec<_> = ledger.calls().into_iter().map(|c| c.artifact).collect();
    assert_eq!(names, ["DMT", "DemoCrowdsale"]);
}

#[tokio::test]
async fn test_profile_gas_and_price_reach_every_deployment() {
    let ledger = ScriptedLedger::new([Ok(TOKEN_ADDRESS), Ok(SALE_ADDRESS)]);
    let profile = profile(ROPSTEN);
    let mut orchestrator = SaleOrchestrator::new(&ledger, &profile, params(), artifacts());

    orchestrator.run_at(NOW).await;

    for call in ledger.calls() {
        assert_eq!(
            call.options,
            TxOptions {
                gas_price: 50_000_000_000,
                gas: Some(ROPSTEN_GAS),
            }
        );
    }
}

#[tokio::test]
async fn test_opening_time_in_the_past_fails_before_token() {
    let ledger = ScriptedLedger::default();
    let profile = profile(DEVELOPMENT);
    let mut orchestrator = SaleOrchestrator::new(&ledger, &profile, params(), artifacts());

    let outcome = orchestrator.run_at(1_526_403_601).await;

    assert_eq!(outcome.state(), RunState::Failed);
    assert!(ledger.calls().is_empty());
}

#[tokio::test]
async fn test_zero_crowdsale_address_is_partial() {
    let ledger = ScriptedLedger::new([Ok(TOKEN_ADDRESS), Ok(Address::ZERO)]);
    let profile = profile(DEVELOPMENT);
    let mut orchestrator = SaleOrchestrator::new(&ledger, &profile, params(), artifacts());

    let outcome = orchestrator.run_at(NOW).await;

    assert_eq!(outcome.state(), RunState::PartiallyComplete);
    assert_eq!(outcome.token().map(|t| t.address), Some(TOKEN_ADDRESS));
    assert!(matches!(
        outcome.error(),
        Some(DeployError::TransactionRejected { artifact, .. }) if artifact == "DemoCrowdsale"
    ));
    assert_eq!(orchestrator.deployed().len(), 1);
}

#[tokio::test]
async fn test_resume_with_existing_token_without_token_artifact() {
    let ledger = ScriptedLedger::new([Ok(SALE_ADDRESS)]);
    let profile = profile(DEVELOPMENT);
    let artifacts = SaleArtifacts::with_existing_token("DMT", crowdsale_artifact());
    let mut orchestrator = SaleOrchestrator::new(&ledger, &profile, params(), artifacts);

    let outcome = orchestrator
        .resume(ResumeFrom::ExistingToken(TOKEN_ADDRESS), NOW)
        .await;

    assert_eq!(outcome.state(), RunState::Complete);
    assert_eq!(outcome.token().map(|t| t.name.as_str()), Some("DMT"));
    assert_eq!(ledger.calls().len(), 1);
}

#[tokio::test]
async fn test_fresh_run_without_token_artifact_fails_before_ledger() {
    let ledger = ScriptedLedger::default();
    let profile = profile(DEVELOPMENT);
    let artifacts = SaleArtifacts::with_existing_token("DMT", crowdsale_artifact());
    let mut orchestrator = SaleOrchestrator::new(&ledger, &profile, params(), artifacts);

    let outcome = orchestrator.resume(ResumeFrom::FreshToken, NOW).await;

    assert!(matches!(
        outcome.error(),
        Some(DeployError::Artifact { name, .. }) if name == "DMT"
    ));
    assert!(ledger.calls().is_empty());
    assert_eq!(
        orchestrator.history(),
        &[RunState::NotStarted, RunState::Failed]
    );
}
