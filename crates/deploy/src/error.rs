//! Error taxonomy for token sale deployments.

use std::time::Duration;

use alloy_core::primitives::{Address, B256};
use thiserror::Error;

/// Errors surfaced by a deployment run.
///
/// Ledger failures carry the name of the artifact being deployed so the
/// operator can tell which step failed.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Missing or invalid credentials, endpoint or network selection.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Deployment parameters that would make the crowdsale unusable on-chain.
    #[error("invalid deployment parameters: {0}")]
    Parameter(String),

    /// A compiled contract artifact could not be loaded.
    #[error("artifact {name}: {reason}")]
    Artifact { name: String, reason: String },

    /// Transport or provider failure while talking to the ledger.
    ///
    /// `context` names the operation, e.g. `deploying DMT`.
    #[error("network error while {context}: {message}")]
    Network { context: String, message: String },

    /// The ledger refused or reverted the deployment transaction.
    #[error("transaction deploying {artifact} rejected: {reason}")]
    TransactionRejected { artifact: String, reason: String },

    /// The deployment transaction was not confirmed in time.
    #[error(
        "timed out after {}s waiting for {artifact} deployment (tx {tx_hash}){}",
        waited.as_secs(),
        last_error_suffix(last_error)
    )]
    Timeout {
        artifact: String,
        tx_hash: B256,
        waited: Duration,
        /// Last failure while polling for the receipt.
        last_error: Option<String>,
    },

    /// Another run already holds the lock for this credential.
    #[error("another deployment is already running with account {0}")]
    CredentialBusy(Address),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map(|e| format!(", last poll error: {e}"))
        .unwrap_or_default()
}

impl DeployError {
    pub(crate) fn artifact(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Artifact {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
