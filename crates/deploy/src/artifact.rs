//! Compiled contract artifacts.
//!
//! Artifacts are the JSON files produced by the contract toolchain. Both the
//! truffle layout (`"bytecode": "0x..."`) and the foundry layout
//! (`"bytecode": { "object": "0x..." }`) are accepted.

use std::path::{Path, PathBuf};

use alloy_core::{
    primitives::{Address, Bytes, U256},
    sol_types::SolValue,
};
use serde::{Deserialize, Serialize};

use crate::{DeployError, ValidatedParameters};

/// Default name of the token contract.
pub const DEFAULT_TOKEN_CONTRACT: &str = "DMT";
/// Default name of the crowdsale contract.
pub const DEFAULT_CROWDSALE_CONTRACT: &str = "DemoCrowdsale";
/// Default directory holding the compiled artifacts.
pub const DEFAULT_ARTIFACTS_DIR: &str = "build/contracts";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Hex(String),
    Object { object: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    contract_name: Option<String>,
    bytecode: BytecodeField,
}

/// A deployable contract: its name and creation bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifact {
    pub name: String,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Parse an artifact from its JSON representation.
    pub fn from_json(name: &str, json: &str) -> Result<Self, DeployError> {
        let file: ArtifactFile = serde_json::from_str(json)
            .map_err(|e| DeployError::artifact(name, format!("malformed artifact: {e}")))?;

        if let Some(contract_name) = &file.contract_name {
            if contract_name != name {
                tracing::warn!(
                    expected = name,
                    found = %contract_name,
                    "Artifact contract name does not match the requested contract"
                );
            }
        }

        let raw = match &file.bytecode {
            BytecodeField::Hex(hex) => hex.as_str(),
            BytecodeField::Object { object } => object.as_str(),
        };

        // Truffle leaves `__LibName____` placeholders for unlinked libraries.
        if raw.contains("__") {
            return Err(DeployError::artifact(
                name,
                "bytecode references unlinked libraries",
            ));
        }

        let bytecode = hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| DeployError::artifact(name, format!("invalid bytecode hex: {e}")))?;

        if bytecode.is_empty() {
            return Err(DeployError::artifact(
                name,
                "empty bytecode (abstract contract or interface?)",
            ));
        }

        Ok(Self {
            name: name.to_string(),
            bytecode: bytecode.into(),
        })
    }

    /// Creation payload: bytecode followed by the ABI-encoded constructor arguments.
    pub fn creation_code(&self, constructor_args: &[u8]) -> Bytes {
        let mut code = Vec::with_capacity(self.bytecode.len() + constructor_args.len());
        code.extend_from_slice(&self.bytecode);
        code.extend_from_slice(constructor_args);
        code.into()
    }
}

/// Loads artifacts by contract name from a build directory.
#[derive(Debug, Clone)]
pub struct ArtifactRegistry {
    dir: PathBuf,
}

impl ArtifactRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load `<dir>/<name>.json`.
    pub fn load(&self, name: &str) -> Result<ContractArtifact, DeployError> {
        let path = self.dir.join(format!("{name}.json"));
        let content = std::fs::read_to_string(&path).map_err(|e| {
            DeployError::artifact(name, format!("failed to read {}: {e}", path.display()))
        })?;

        let artifact = ContractArtifact::from_json(name, &content)?;
        tracing::debug!(
            contract = name,
            path = %path.display(),
            bytecode_len = artifact.bytecode.len(),
            "Artifact loaded"
        );
        Ok(artifact)
    }

    /// Load both contracts of the sale.
    pub fn load_sale(&self, names: &ArtifactNames) -> Result<SaleArtifacts, DeployError> {
        Ok(SaleArtifacts::new(
            self.load(&names.token)?,
            self.load(&names.crowdsale)?,
        ))
    }

    /// Load only the crowdsale, for a run bound to a token that is already live.
    pub fn load_for_existing_token(
        &self,
        names: &ArtifactNames,
    ) -> Result<SaleArtifacts, DeployError> {
        Ok(SaleArtifacts::with_existing_token(
            names.token.clone(),
            self.load(&names.crowdsale)?,
        ))
    }
}

/// Contract names to deploy, from the `[artifacts]` configuration table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactNames {
    pub dir: PathBuf,
    pub token: String,
    pub crowdsale: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            token: DEFAULT_TOKEN_CONTRACT.to_string(),
            crowdsale: DEFAULT_CROWDSALE_CONTRACT.to_string(),
        }
    }
}

/// The token and crowdsale artifacts, loaded before any deployment starts.
#[derive(Debug, Clone)]
pub struct SaleArtifacts {
    pub token_name: String,
    /// `None` when the token is already deployed and only its name is known.
    pub token: Option<ContractArtifact>,
    pub crowdsale: ContractArtifact,
}

impl SaleArtifacts {
    pub fn new(token: ContractArtifact, crowdsale: ContractArtifact) -> Self {
        Self {
            token_name: token.name.clone(),
            token: Some(token),
            crowdsale,
        }
    }

    pub fn with_existing_token(token_name: impl Into<String>, crowdsale: ContractArtifact) -> Self {
        Self {
            token_name: token_name.into(),
            token: None,
            crowdsale,
        }
    }
}

/// Constructor arguments of the crowdsale contract.
///
/// Encoded as `(address wallet, address token, uint256 openingTime,
/// uint256 closingTime, uint256 rate, uint256 goal, uint256 cap)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrowdsaleArgs {
    pub wallet: Address,
    pub token: Address,
    pub opening_time: u64,
    pub closing_time: u64,
    pub rate: u64,
    pub goal: U256,
    pub cap: U256,
}

impl CrowdsaleArgs {
    pub fn new(params: &ValidatedParameters, token: Address) -> Self {
        Self {
            wallet: params.beneficiary,
            token,
            opening_time: params.opening_time,
            closing_time: params.closing_time,
            rate: params.rate,
            goal: params.goal,
            cap: params.cap,
        }
    }

    pub fn abi_encode(&self) -> Bytes {
        (
            self.wallet,
            self.token,
            U256::from(self.opening_time),
            U256::from(self.closing_time),
            U256::from(self.rate),
            self.goal,
            self.cap,
        )
            .abi_encode_params()
            .into()
    }
}
