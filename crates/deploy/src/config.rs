//! Configuration loading.
//!
//! Configuration is read from a TOML file (default `Tokensale.toml`) and
//! overridden by `TOKENSALE_*` environment variables, with `__` separating
//! nested keys (e.g. `TOKENSALE_CREDENTIALS__MNEMONIC`).

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
    ArtifactNames, ConfirmationConfig, DeployError, DeploymentParameters, NetworkProfile,
    NetworkRegistry, ProviderCredentials, lock::default_lock_dir, record::DEFAULT_RECORDS_DIR,
};

/// The default name of the configuration file.
pub const CONFIG_FILENAME: &str = "Tokensale.toml";
/// Prefix of the environment variables overriding the configuration.
pub const ENV_PREFIX: &str = "TOKENSALE_";

/// Everything a run needs besides the network name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokensaleConfig {
    #[serde(default = "default_records_dir")]
    pub records_dir: PathBuf,
    /// Directory for credential lock files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_dir: Option<PathBuf>,
    /// Signer mnemonic and remote provider URL.
    #[serde(default)]
    pub credentials: ProviderCredentials,
    /// Sale parameters. Required to deploy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale: Option<DeploymentParameters>,
    #[serde(default)]
    pub artifacts: ArtifactNames,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    /// Extra or overriding network profiles, keyed by name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkProfile>,
}

fn default_records_dir() -> PathBuf {
    PathBuf::from(DEFAULT_RECORDS_DIR)
}

impl Default for TokensaleConfig {
    fn default() -> Self {
        Self {
            records_dir: default_records_dir(),
            lock_dir: None,
            credentials: ProviderCredentials::default(),
            sale: None,
            artifacts: ArtifactNames::default(),
            confirmation: ConfirmationConfig::default(),
            networks: BTreeMap::new(),
        }
    }
}

impl TokensaleConfig {
    /// Load the configuration.
    ///
    /// `path` may point to a file or to a directory containing
    /// [`CONFIG_FILENAME`]; a missing file yields the defaults. When
    /// `credentials_file` is given it must be a JSON file with `mnemonic` and
    /// `providerUrl` keys, and it takes precedence over the TOML file.
    pub fn load(path: &Path, credentials_file: Option<&Path>) -> Result<Self, DeployError> {
        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let mut figment = Figment::new().merge(Toml::file(&config_path));

        if let Some(credentials_file) = credentials_file {
            if !credentials_file.exists() {
                return Err(DeployError::Configuration(format!(
                    "credentials file not found: {}",
                    credentials_file.display()
                )));
            }

            let credentials: ProviderCredentials = Figment::from(Json::file(credentials_file))
                .extract()
                .map_err(|e| {
                    DeployError::Configuration(format!(
                        "invalid credentials file {}: {e}",
                        credentials_file.display()
                    ))
                })?;
            figment = figment.merge(Serialized::default("credentials", credentials));
        }

        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| DeployError::Configuration(e.to_string()))?;

        tracing::debug!(
            path = %config_path.display(),
            networks = config.networks.len(),
            has_sale = config.sale.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Default profiles extended with the configured ones.
    pub fn registry(&self) -> NetworkRegistry {
        NetworkRegistry::with_defaults().extend(self.networks.clone())
    }

    pub fn sale(&self) -> Result<&DeploymentParameters, DeployError> {
        self.sale.as_ref().ok_or_else(|| {
            DeployError::Configuration("missing [sale] section with the deployment parameters".into())
        })
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir.clone().unwrap_or_else(default_lock_dir)
    }

    /// Serialize the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }
}
