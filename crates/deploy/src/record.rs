//! Deployment records.
//!
//! After every run a record is written to `{records_dir}/{network}.json` so
//! the operator can find deployed addresses and resume a partial run.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{DeploymentOutcome, DeploymentParameters};

/// Default directory for deployment records.
pub const DEFAULT_RECORDS_DIR: &str = "deployments";

/// Final status of a recorded run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RecordStatus {
    Complete,
    Failed,
    PartiallyComplete,
}

/// What a run left behind on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub network: String,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crowdsale: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Hash of the sale parameters used for the run.
    pub params_hash: String,
    /// Unix timestamp when the record was written.
    pub recorded_at: u64,
    /// Version of the tool that wrote the record.
    pub tool_version: String,
}

impl DeploymentRecord {
    pub fn from_outcome(
        network: &str,
        params: &DeploymentParameters,
        outcome: &DeploymentOutcome,
    ) -> Self {
        let status = match outcome {
            DeploymentOutcome::Complete { .. } => RecordStatus::Complete,
            DeploymentOutcome::Failed { .. } => RecordStatus::Failed,
            DeploymentOutcome::PartiallyComplete { .. } => RecordStatus::PartiallyComplete,
        };

        Self {
            network: network.to_string(),
            status,
            token: outcome.token().map(|t| t.address),
            crowdsale: outcome.crowdsale().map(|c| c.address),
            error: outcome.error().map(ToString::to_string),
            params_hash: params.compute_hash(),
            recorded_at: crate::orchestrator::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Path of the record of `network` under `dir`.
    pub fn path_for(dir: &Path, network: &str) -> PathBuf {
        dir.join(format!("{network}.json"))
    }

    /// Write the record as pretty JSON, creating the directory if needed.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create records directory {}", parent.display())
            })?;
        }

        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment record")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write deployment record to {}", path.display()))?;

        tracing::info!(path = %path.display(), status = %self.status, "Deployment record saved");
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Deployment record does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment record {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deployment record {}", path.display()))
    }

    /// Whether the record was written for the same sale parameters.
    pub fn matches_params(&self, params: &DeploymentParameters) -> bool {
        self.params_hash == params.compute_hash()
    }
}
