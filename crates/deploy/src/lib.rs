//! tokensale-deploy - Deployment library for a token sale.
//!
//! This crate deploys a token contract and then a crowdsale contract bound to
//! that token's address, against a named network profile.

mod artifact;
pub use artifact::{
    ArtifactNames, ArtifactRegistry, ContractArtifact, CrowdsaleArgs, DEFAULT_ARTIFACTS_DIR,
    DEFAULT_CROWDSALE_CONTRACT, DEFAULT_TOKEN_CONTRACT, SaleArtifacts,
};

mod config;
pub use config::{CONFIG_FILENAME, ENV_PREFIX, TokensaleConfig};

mod error;
pub use error::DeployError;

mod ledger;
pub use ledger::{
    ConfirmationConfig, ContractDeployer, DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_GAS_LIMIT,
    DeployRequest, DeployedArtifact, DeploymentReceipt, RpcDeployer, TxOptions,
};

mod lock;
pub use lock::{CredentialLock, default_lock_dir};

pub mod network;
pub use network::{
    NetworkBinding, NetworkId, NetworkProfile, NetworkRegistry, ProviderCredentials,
    derive_signer,
};

mod orchestrator;
pub use orchestrator::{DeploymentOutcome, ResumeFrom, RunState, SaleOrchestrator, now};

mod params;
pub use params::{DeploymentParameters, ValidatedParameters, format_timestamp};

mod record;
pub use record::{DEFAULT_RECORDS_DIR, DeploymentRecord, RecordStatus};

pub mod rpc;
pub mod tx;
