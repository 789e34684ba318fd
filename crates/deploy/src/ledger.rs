//! Ledger collaborator: the seam between the orchestrator and the chain.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{
    ContractArtifact, DeployError, NetworkBinding,
    rpc::{self, RpcError},
    tx::LegacyTransaction,
};

/// Gas limit used when the network profile does not set one.
pub const DEFAULT_GAS_LIMIT: u64 = 6_721_975;
/// Default bound on the wait for a deployment receipt.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 600;
/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Transaction options attached to every deployment of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOptions {
    pub gas_price: u64,
    /// Gas limit. `None` lets the deployer pick its default.
    pub gas: Option<u64>,
}

/// A single deployment to perform.
#[derive(Debug, Clone, Copy)]
pub struct DeployRequest<'a> {
    pub artifact: &'a ContractArtifact,
    /// ABI-encoded constructor arguments, appended to the bytecode.
    pub constructor_args: &'a [u8],
    pub options: TxOptions,
}

/// A contract live on the target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedArtifact {
    pub name: String,
    pub address: Address,
    /// Creation transaction. `None` for contracts supplied by the operator.
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

impl DeployedArtifact {
    /// A contract deployed by an earlier run, known only by its address.
    pub fn existing(name: impl Into<String>, address: Address) -> Self {
        Self {
            name: name.into(),
            address,
            tx_hash: None,
            block_number: None,
            gas_used: None,
        }
    }
}

/// Something that can publish a contract and wait until it is live.
///
/// Implementations must not retry a deployment on their own: a resent
/// creation transaction deploys a second contract.
pub trait ContractDeployer {
    fn deploy<'a>(
        &'a self,
        request: DeployRequest<'a>,
    ) -> impl Future<Output = Result<DeployedArtifact, DeployError>> + Send + 'a;
}

impl<T: ContractDeployer + Sync> ContractDeployer for &T {
    fn deploy<'a>(
        &'a self,
        request: DeployRequest<'a>,
    ) -> impl Future<Output = Result<DeployedArtifact, DeployError>> + Send + 'a {
        (**self).deploy(request)
    }
}

/// Bounds on the wait for a deployment to be mined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl ConfirmationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Receipt fields needed to confirm a deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReceipt {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub gas_used: Option<String>,
}

impl DeploymentReceipt {
    /// Turn a receipt into a deployed artifact, or the reason it is not one.
    pub fn into_artifact(self, name: &str, tx_hash: B256) -> Result<DeployedArtifact, DeployError> {
        let rejected = |reason: String| DeployError::TransactionRejected {
            artifact: name.to_string(),
            reason,
        };

        // Pre-byzantium receipts carry no status.
        if self.status.as_deref().is_some_and(|s| s == "0x0") {
            return Err(rejected(format!("transaction {tx_hash} reverted")));
        }

        let address = self
            .contract_address
            .filter(|a| *a != Address::ZERO)
            .ok_or_else(|| rejected(format!("receipt of {tx_hash} has no contract address")))?;

        Ok(DeployedArtifact {
            name: name.to_string(),
            address,
            tx_hash: Some(tx_hash),
            block_number: self
                .block_number
                .and_then(|n| rpc::parse_quantity("eth_getTransactionReceipt", &n).ok()),
            gas_used: self
                .gas_used
                .and_then(|n| rpc::parse_quantity("eth_getTransactionReceipt", &n).ok()),
        })
    }
}

/// Deploys contracts through a JSON-RPC node, signing locally.
#[derive(Debug)]
pub struct RpcDeployer<'a> {
    binding: &'a NetworkBinding<'a>,
    chain_id: u64,
    confirmation: ConfirmationConfig,
}

impl<'a> RpcDeployer<'a> {
    /// Query the chain id used for replay protection and build the deployer.
    pub async fn new(
        binding: &'a NetworkBinding<'a>,
        confirmation: ConfirmationConfig,
    ) -> Result<Self, DeployError> {
        let chain_id: String = rpc::json_rpc_call(
            &binding.client,
            binding.endpoint.as_str(),
            "eth_chainId",
            vec![],
        )
        .await
        .map_err(|e| network_error("querying chain id", e))?;
        let chain_id = rpc::parse_quantity("eth_chainId", &chain_id)
            .map_err(|e| network_error("querying chain id", e))?;

        tracing::debug!(chain_id, network = %binding.profile.name, "Chain id fetched");

        Ok(Self {
            binding,
            chain_id,
            confirmation,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T, RpcError> {
        rpc::json_rpc_call(
            &self.binding.client,
            self.binding.endpoint.as_str(),
            method,
            params,
        )
        .await
    }

    async fn deploy_inner(&self, request: DeployRequest<'_>) -> Result<DeployedArtifact, DeployError> {
        let name = request.artifact.name.as_str();
        let context = format!("deploying {name}");
        let from = self.binding.address();

        let nonce: String = self
            .call(
                "eth_getTransactionCount",
                vec![serde_json::json!(from), serde_json::json!("pending")],
            )
            .await
            .map_err(|e| network_error(&context, e))?;
        let nonce = rpc::parse_quantity("eth_getTransactionCount", &nonce)
            .map_err(|e| network_error(&context, e))?;

        let tx = LegacyTransaction {
            nonce,
            gas_price: u128::from(request.options.gas_price),
            gas_limit: request.options.gas.unwrap_or(DEFAULT_GAS_LIMIT),
            to: None,
            value: U256::ZERO,
            input: request.artifact.creation_code(request.constructor_args),
            chain_id: self.chain_id,
        };
        let signed = tx.sign(self.binding.signer.credential())?;

        tracing::info!(
            contract = name,
            nonce,
            gas_price = tx.gas_price,
            gas_limit = tx.gas_limit,
            expected_address = %from.create(nonce),
            "Sending deployment transaction..."
        );

        let tx_hash: B256 = self
            .call("eth_sendRawTransaction", vec![serde_json::json!(signed.raw)])
            .await
            .map_err(|e| match e {
                RpcError::Response { message, .. } => DeployError::TransactionRejected {
                    artifact: name.to_string(),
                    reason: message,
                },
                other => network_error(&context, other),
            })?;

        if tx_hash != signed.hash {
            tracing::warn!(
                returned = %tx_hash,
                computed = %signed.hash,
                "Node returned an unexpected transaction hash"
            );
        }

        tracing::info!(contract = name, tx_hash = %tx_hash, "Waiting for confirmation...");

        let receipt = rpc::poll_until(
            name,
            self.confirmation.timeout(),
            self.confirmation.poll_interval(),
            || self.call::<Option<DeploymentReceipt>>(
                "eth_getTransactionReceipt",
                vec![serde_json::json!(tx_hash)],
            ),
        )
        .await
        .map_err(|timeout| DeployError::Timeout {
            artifact: name.to_string(),
            tx_hash,
            waited: self.confirmation.timeout(),
            last_error: timeout.last_error.map(|e| e.to_string()),
        })?;

        let deployed = receipt.into_artifact(name, tx_hash)?;
        tracing::info!(
            contract = name,
            address = %deployed.address,
            block = ?deployed.block_number,
            gas_used = ?deployed.gas_used,
            "Contract deployed"
        );
        Ok(deployed)
    }
}

impl ContractDeployer for RpcDeployer<'_> {
    fn deploy<'a>(
        &'a self,
        request: DeployRequest<'a>,
    ) -> impl Future<Output = Result<DeployedArtifact, DeployError>> + Send + 'a {
        self.deploy_inner(request)
    }
}

fn network_error(context: &str, e: RpcError) -> DeployError {
    DeployError::Network {
        context: context.to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::{address, b256};

    use super::*;

    const TX: B256 = b256!("28ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276");

    fn receipt(json: serde_json::Value) -> DeploymentReceipt {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_successful_receipt() {
        let deployed = receipt(serde_json::json!({
            "status": "0x1",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "blockNumber": "0x1b4",
            "gasUsed": "0x2dc6c0"
        }))
        .into_artifact("DMT", TX)
        .unwrap();

        assert_eq!(deployed.address, address!("5FbDB2315678afecb367f032d93F642f64180aa3"));
        assert_eq!(deployed.block_number, Some(436));
        assert_eq!(deployed.gas_used, Some(3_000_000));
        assert_eq!(deployed.tx_hash, Some(TX));
    }

    #[test]
    fn test_reverted_receipt() {
        let err = receipt(serde_json::json!({
            "status": "0x0",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        }))
        .into_artifact("DemoCrowdsale", TX)
        .unwrap_err();

        assert!(matches!(err, DeployError::TransactionRejected { ref artifact, .. } if artifact == "DemoCrowdsale"));
    }

    #[test]
    fn test_receipt_without_address() {
        let err = receipt(serde_json::json!({"status": "0x1", "contractAddress": null}))
            .into_artifact("DMT", TX)
            .unwrap_err();
        assert!(matches!(err, DeployError::TransactionRejected { .. }));
    }

    #[test]
    fn test_pre_byzantium_receipt() {
        let deployed = receipt(serde_json::json!({
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        }))
        .into_artifact("DMT", TX)
        .unwrap();
        assert!(deployed.block_number.is_none());
    }

    #[test]
    fn test_confirmation_defaults() {
        let config = ConfirmationConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(600));
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
    }
}
