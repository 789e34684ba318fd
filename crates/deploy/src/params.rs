//! Crowdsale deployment parameters.

use alloy_core::primitives::{Address, U256};
use chrono::DateTime;
use derive_more::Deref;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::DeployError;

/// Parameters passed to the token and crowdsale constructors.
///
/// Loaded from the `[sale]` table of the configuration file. Amounts are in wei.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentParameters {
    /// Wallet receiving the raised funds.
    pub beneficiary: Address,
    /// Sale opening time (unix seconds).
    pub opening_time: u64,
    /// Sale closing time (unix seconds).
    pub closing_time: u64,
    /// Tokens minted per wei.
    pub rate: u64,
    /// Minimum amount raised for the sale to succeed.
    pub goal: U256,
    /// Maximum amount the sale accepts.
    pub cap: U256,
    /// Gas price used for both deployment transactions.
    pub gas_price: u64,
}

/// Parameters that passed [`DeploymentParameters::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Deref)]
pub struct ValidatedParameters(DeploymentParameters);

impl DeploymentParameters {
    /// Check the parameters against the crowdsale constructor requirements.
    ///
    /// `now` is the current unix time in seconds. The crowdsale rejects an
    /// opening time in the past, so catching it here saves the token
    /// deployment fees.
    pub fn validate(&self, now: u64) -> Result<ValidatedParameters, DeployError> {
        if self.opening_time > self.closing_time {
            return Err(DeployError::Parameter(format!(
                "opening time {} is after closing time {}",
                format_timestamp(self.opening_time),
                format_timestamp(self.closing_time)
            )));
        }

        if self.opening_time < now {
            return Err(DeployError::Parameter(format!(
                "opening time {} is in the past (now is {})",
                format_timestamp(self.opening_time),
                format_timestamp(now)
            )));
        }

        if self.goal > self.cap {
            return Err(DeployError::Parameter(format!(
                "funding goal {} exceeds funding cap {}",
                self.goal, self.cap
            )));
        }

        if self.cap.is_zero() {
            return Err(DeployError::Parameter("funding cap must be positive".into()));
        }

        if self.rate == 0 {
            return Err(DeployError::Parameter("exchange rate must be positive".into()));
        }

        if self.beneficiary == Address::ZERO {
            return Err(DeployError::Parameter(
                "beneficiary must not be the zero address".into(),
            ));
        }

        Ok(ValidatedParameters(self.clone()))
    }

    /// SHA-256 of the canonical JSON encoding, hex encoded.
    ///
    /// Used to detect a resume with parameters that differ from the recorded run.
    pub fn compute_hash(&self) -> String {
        // Field order is fixed by the struct definition.
        let json = serde_json::to_string(self)
            .expect("DeploymentParameters serialization should never fail");

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Render a unix timestamp as RFC 3339, falling back to the raw number.
pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
