//! Token sale deployment orchestration.
//!
//! The deployment order is fixed: token, then crowdsale. The crowdsale
//! constructor takes the token address, so the second step blocks on the
//! first and is never attempted without it.
//!
//! ```text
//! NotStarted -> TokenDeploying -> TokenDeployed -> CrowdsaleDeploying -> Complete
//!     |               |                                    |
//!     +-> Failed <----+                                    +-> PartiallyComplete
//! ```
//!
//! A resume with an existing token enters `TokenDeployed` directly.

use alloy_core::primitives::Address;

use crate::{
    ContractDeployer, CrowdsaleArgs, DeployError, DeployRequest, DeployedArtifact,
    DeploymentParameters, NetworkProfile, SaleArtifacts, TxOptions, ValidatedParameters,
};

/// State of a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum RunState {
    NotStarted,
    TokenDeploying,
    TokenDeployed,
    CrowdsaleDeploying,
    Complete,
    Failed,
    PartiallyComplete,
}

impl RunState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;

        matches!(
            (self, next),
            (NotStarted, TokenDeploying)
                | (NotStarted, TokenDeployed)
                | (NotStarted, Failed)
                | (TokenDeploying, TokenDeployed)
                | (TokenDeploying, Failed)
                | (TokenDeployed, CrowdsaleDeploying)
                | (CrowdsaleDeploying, Complete)
                | (CrowdsaleDeploying, PartiallyComplete)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Complete | RunState::Failed | RunState::PartiallyComplete
        )
    }
}

/// How a resumed run obtains its token. There is no implicit default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeFrom {
    /// Reuse a token deployed by an earlier run; only the crowdsale is deployed.
    ExistingToken(Address),
    /// Deploy a new token, then the crowdsale.
    FreshToken,
}

/// Terminal result of a run.
#[derive(Debug)]
pub enum DeploymentOutcome {
    /// Both contracts are live.
    Complete {
        token: DeployedArtifact,
        crowdsale: DeployedArtifact,
    },
    /// Nothing was deployed.
    Failed { error: DeployError },
    /// The token is live but the crowdsale is not.
    PartiallyComplete {
        token: DeployedArtifact,
        error: DeployError,
    },
}

impl DeploymentOutcome {
    pub fn state(&self) -> RunState {
        match self {
            Self::Complete { .. } => RunState::Complete,
            Self::Failed { .. } => RunState::Failed,
            Self::PartiallyComplete { .. } => RunState::PartiallyComplete,
        }
    }

    /// Process exit code: 0 complete, 1 nothing deployed, 2 needs a resume.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Complete { .. } => 0,
            Self::Failed { .. } => 1,
            Self::PartiallyComplete { .. } => 2,
        }
    }

    pub fn token(&self) -> Option<&DeployedArtifact> {
        match self {
            Self::Complete { token, .. } | Self::PartiallyComplete { token, .. } => Some(token),
            Self::Failed { .. } => None,
        }
    }

    pub fn crowdsale(&self) -> Option<&DeployedArtifact> {
        match self {
            Self::Complete { crowdsale, .. } => Some(crowdsale),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DeployError> {
        match self {
            Self::Failed { error } | Self::PartiallyComplete { error, .. } => Some(error),
            Self::Complete { .. } => None,
        }
    }
}

/// Drives the two deployment steps of a token sale against one network.
pub struct SaleOrchestrator<'a, D> {
    ledger: D,
    profile: &'a NetworkProfile,
    params: DeploymentParameters,
    artifacts: SaleArtifacts,
    state: RunState,
    history: Vec<RunState>,
    deployed: Vec<DeployedArtifact>,
}

impl<'a, D: ContractDeployer> SaleOrchestrator<'a, D> {
    pub fn new(
        ledger: D,
        profile: &'a NetworkProfile,
        params: DeploymentParameters,
        artifacts: SaleArtifacts,
    ) -> Self {
        Self {
            ledger,
            profile,
            params,
            artifacts,
            state: RunState::NotStarted,
            history: vec![RunState::NotStarted],
            deployed: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state visited so far, in order.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// Artifacts deployed or adopted by this run, in deployment order.
    pub fn deployed(&self) -> &[DeployedArtifact] {
        &self.deployed
    }

    fn transition(&mut self, next: RunState) {
        assert!(
            self.state.can_transition_to(next),
            "invalid deployment state transition {} -> {}",
            self.state,
            next
        );

        tracing::debug!(from = %self.state, to = %next, network = %self.profile.name, "Deployment state changed");
        self.state = next;
        self.history.push(next);
    }

    fn tx_options(&self) -> TxOptions {
        TxOptions {
            gas_price: self.params.gas_price,
            gas: self.profile.gas,
        }
    }

    fn fail(&mut self, error: DeployError) -> DeploymentOutcome {
        self.transition(RunState::Failed);
        tracing::error!(error = %error, "Deployment failed, no artifacts deployed");
        DeploymentOutcome::Failed { error }
    }

    /// Deploy token and crowdsale, validating parameters against the current time.
    pub async fn run(&mut self) -> DeploymentOutcome {
        self.run_at(now()).await
    }

    /// Deploy token and crowdsale, validating parameters against `now`.
    pub async fn run_at(&mut self, now: u64) -> DeploymentOutcome {
        let params = match self.params.validate(now) {
            Ok(params) => params,
            Err(error) => return self.fail(error),
        };

        tracing::info!(
            network = %self.profile.name,
            token = %self.artifacts.token_name,
            crowdsale = %self.artifacts.crowdsale.name,
            "Starting token sale deployment..."
        );

        let token = match self.deploy_token().await {
            Ok(token) => token,
            Err(error) => return self.fail(error),
        };

        self.deploy_crowdsale(&params, token).await
    }

    /// Resume after a partial run, with an explicit choice of token.
    pub async fn resume(&mut self, from: ResumeFrom, now: u64) -> DeploymentOutcome {
        let token = match from {
            ResumeFrom::FreshToken => {
                tracing::info!("Resuming with a freshly deployed token");
                return self.run_at(now).await;
            }
            ResumeFrom::ExistingToken(address) => address,
        };

        let params = match self.params.validate(now) {
            Ok(params) => params,
            Err(error) => return self.fail(error),
        };

        if token == Address::ZERO {
            return self.fail(DeployError::Parameter(
                "cannot resume with the zero address as token".into(),
            ));
        }

        tracing::info!(
            network = %self.profile.name,
            token = %token,
            "Resuming deployment with existing token..."
        );

        let token = DeployedArtifact::existing(self.artifacts.token_name.clone(), token);
        self.transition(RunState::TokenDeployed);
        self.deployed.push(token.clone());

        self.deploy_crowdsale(&params, token).await
    }

    async fn deploy_token(&mut self) -> Result<DeployedArtifact, DeployError> {
        let artifact = self.artifacts.token.clone().ok_or_else(|| {
            DeployError::artifact(
                self.artifacts.token_name.as_str(),
                "token artifact was not loaded, resume with the existing token instead",
            )
        })?;

        self.transition(RunState::TokenDeploying);

        let request = DeployRequest {
            artifact: &artifact,
            constructor_args: &[],
            options: self.tx_options(),
        };
        let token = self.ledger.deploy(request).await?;
        let token = reject_zero_address(&artifact.name, token)?;

        self.transition(RunState::TokenDeployed);
        self.deployed.push(token.clone());
        tracing::info!(address = %token.address, "Token deployed");
        Ok(token)
    }

    async fn deploy_crowdsale(
        &mut self,
        params: &ValidatedParameters,
        token: DeployedArtifact,
    ) -> DeploymentOutcome {
        self.transition(RunState::CrowdsaleDeploying);

        let args = CrowdsaleArgs::new(params, token.address).abi_encode();
        let request = DeployRequest {
            artifact: &self.artifacts.crowdsale,
            constructor_args: &args,
            options: self.tx_options(),
        };

        let result = self
            .ledger
            .deploy(request)
            .await
            .and_then(|crowdsale| reject_zero_address(&self.artifacts.crowdsale.name, crowdsale));
        match result {
            Ok(crowdsale) => {
                self.transition(RunState::Complete);
                self.deployed.push(crowdsale.clone());
                tracing::info!(
                    token = %token.address,
                    crowdsale = %crowdsale.address,
                    "Token sale deployment complete"
                );
                DeploymentOutcome::Complete { token, crowdsale }
            }
            Err(error) => {
                self.transition(RunState::PartiallyComplete);
                tracing::error!(
                    error = %error,
                    token = %token.address,
                    "Crowdsale deployment failed, token is live and needs a resume"
                );
                DeploymentOutcome::PartiallyComplete { token, error }
            }
        }
    }
}

fn reject_zero_address(
    name: &str,
    deployed: DeployedArtifact,
) -> Result<DeployedArtifact, DeployError> {
    if deployed.address == Address::ZERO {
        return Err(DeployError::TransactionRejected {
            artifact: name.to_string(),
            reason: "ledger reported the zero address".into(),
        });
    }
    Ok(deployed)
}

/// Current unix time in seconds.
pub fn now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
