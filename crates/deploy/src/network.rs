//! Network profiles and the lazy signer/transport binding.

use std::{collections::BTreeMap, fmt, str::FromStr};

use alloy_core::primitives::Address;
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use derive_more::Deref;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{DeployError, rpc};

/// Name of the remote test network profile.
pub const ROPSTEN: &str = "ropsten";
/// Name of the local development network profile.
pub const DEVELOPMENT: &str = "development";

/// Endpoint of the local development node.
pub const DEVELOPMENT_URL: &str = "http://127.0.0.1:8545/";
/// Gas limit used for deployments on the remote test network.
pub const ROPSTEN_GAS: u64 = 4_412_388;

/// Network id a node must report, or any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "NetworkIdRepr", into = "String")]
pub enum NetworkId {
    #[default]
    Any,
    Id(u64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NetworkIdRepr {
    Number(u64),
    Text(String),
}

impl TryFrom<NetworkIdRepr> for NetworkId {
    type Error = String;

    fn try_from(repr: NetworkIdRepr) -> Result<Self, Self::Error> {
        match repr {
            NetworkIdRepr::Number(id) => Ok(Self::Id(id)),
            NetworkIdRepr::Text(text) => text.parse(),
        }
    }
}

impl FromStr for NetworkId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "*" => Ok(Self::Any),
            id => id
                .parse()
                .map(Self::Id)
                .map_err(|_| format!("invalid network id {id:?}, expected a number or \"*\"")),
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

impl From<NetworkId> for String {
    fn from(id: NetworkId) -> Self {
        id.to_string()
    }
}

impl NetworkId {
    pub fn accepts(&self, reported: u64) -> bool {
        match self {
            Self::Any => true,
            Self::Id(id) => *id == reported,
        }
    }
}

/// Connection parameters of a named network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// Key of the profile in the registry.
    #[serde(skip)]
    pub name: String,
    /// Fixed endpoint. When absent the configured provider URL is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    /// Network id the node must report.
    #[serde(default)]
    pub network_id: NetworkId,
    /// Gas limit for deployment transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
}

impl NetworkProfile {
    /// Human readable endpoint, without exposing the provider URL.
    pub fn endpoint_label(&self) -> String {
        self.url
            .as_ref()
            .map(Url::to_string)
            .unwrap_or_else(|| "<provider_url>".to_string())
    }
}

/// Secret material used to build the signer, as found in the configuration.
///
/// Passed through verbatim to the signer; only presence is checked here.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    #[serde(default, alias = "providerUrl", skip_serializing_if = "Option::is_none")]
    pub provider_url: Option<String>,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "<redacted>"))
            .field("provider_url", &self.provider_url.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ProviderCredentials {
    fn mnemonic(&self) -> Result<&str, DeployError> {
        self.mnemonic
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| DeployError::Configuration("mnemonic is not configured".into()))
    }

    fn provider_url(&self) -> Result<Url, DeployError> {
        let raw = self
            .provider_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| DeployError::Configuration("provider_url is not configured".into()))?;

        Url::parse(raw)
            .map_err(|e| DeployError::Configuration(format!("invalid provider_url: {e}")))
    }
}

/// Named network profiles available to a run.
#[derive(Debug, Clone, PartialEq, Eq, Deref)]
pub struct NetworkRegistry(BTreeMap<String, NetworkProfile>);

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl NetworkRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// The `ropsten` and `development` profiles.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.insert(
            ROPSTEN,
            NetworkProfile {
                name: String::new(),
                url: None,
                network_id: NetworkId::Id(3),
                gas: Some(ROPSTEN_GAS),
            },
        );
        registry.insert(
            DEVELOPMENT,
            NetworkProfile {
                name: String::new(),
                url: Some(Url::parse(DEVELOPMENT_URL).expect("static development url is valid")),
                network_id: NetworkId::Any,
                gas: None,
            },
        );
        registry
    }

    /// Add or replace a profile.
    pub fn insert(&mut self, name: impl Into<String>, mut profile: NetworkProfile) {
        let name = name.into();
        profile.name = name.clone();
        self.0.insert(name, profile);
    }

    /// Add or replace every profile of `profiles`.
    pub fn extend(mut self, profiles: impl IntoIterator<Item = (String, NetworkProfile)>) -> Self {
        for (name, profile) in profiles {
            self.insert(name, profile);
        }
        self
    }

    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&NetworkProfile, DeployError> {
        self.0.get(name).ok_or_else(|| {
            DeployError::Configuration(format!(
                "unknown network {name:?} (known networks: {})",
                self.0.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Build a fresh signer and transport for the named network.
    ///
    /// Nothing is cached: every call derives a new signer from the mnemonic
    /// and creates a new HTTP client.
    pub fn connect<'a>(
        &'a self,
        name: &str,
        credentials: &ProviderCredentials,
    ) -> Result<NetworkBinding<'a>, DeployError> {
        let profile = self.profile(name)?;
        let mnemonic = credentials.mnemonic()?;

        let endpoint = match &profile.url {
            Some(url) => url.clone(),
            None => credentials.provider_url()?,
        };

        let signer = derive_signer(mnemonic, 0)?;
        let client = rpc::create_client()
            .map_err(|e| DeployError::Configuration(format!("failed to create HTTP client: {e}")))?;

        tracing::info!(
            network = %profile.name,
            host = endpoint.host_str().unwrap_or_default(),
            account = %signer.address(),
            "Connected signer to network"
        );

        Ok(NetworkBinding {
            profile,
            endpoint,
            signer,
            client,
        })
    }
}

/// Derive the account at `m/44'/60'/0'/0/<index>` from a mnemonic phrase.
pub fn derive_signer(mnemonic: &str, index: u32) -> Result<PrivateKeySigner, DeployError> {
    MnemonicBuilder::<English>::default()
        .phrase(mnemonic)
        .index(index)
        .and_then(|builder| builder.build())
        .map_err(|e| DeployError::Configuration(format!("cannot derive signer from mnemonic: {e}")))
}

/// A signer and transport bound to one network profile for one run.
pub struct NetworkBinding<'a> {
    pub profile: &'a NetworkProfile,
    pub endpoint: Url,
    pub signer: PrivateKeySigner,
    pub client: reqwest::Client,
}

impl fmt::Debug for NetworkBinding<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkBinding")
            .field("profile", &self.profile.name)
            .field("host", &self.endpoint.host_str())
            .field("account", &self.signer.address())
            .finish()
    }
}

impl NetworkBinding<'_> {
    /// Address of the deploying account.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Check that the node reports the network id required by the profile.
    pub async fn verify_network_id(&self) -> Result<u64, DeployError> {
        let version: String =
            rpc::json_rpc_call(&self.client, self.endpoint.as_str(), "net_version", vec![])
                .await
                .map_err(|e| DeployError::Network {
                    context: "checking network id".into(),
                    message: e.to_string(),
                })?;

        let reported: u64 = version.trim().parse().map_err(|_| DeployError::Network {
            context: "checking network id".into(),
            message: format!("node reported a non-numeric network id {version:?}"),
        })?;

        if !self.profile.network_id.accepts(reported) {
            return Err(DeployError::Configuration(format!(
                "network {} expects network id {} but the node reports {}",
                self.profile.name, self.profile.network_id, reported
            )));
        }

        tracing::debug!(network = %self.profile.name, network_id = reported, "Network id verified");
        Ok(reported)
    }
}
