//! Per-credential run lock.
//!
//! Two runs signing with the same account would race for nonces, so a run
//! holds an exclusive file lock named after the account until it ends.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use fs2::FileExt;

use crate::DeployError;

/// Directory used for lock files when none is configured.
pub fn default_lock_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tokensale")
        .join("locks")
}

/// Exclusive lock on an account, released on drop.
#[derive(Debug)]
pub struct CredentialLock {
    file: File,
    path: PathBuf,
}

impl CredentialLock {
    /// Take the lock for `account`, failing immediately if it is held.
    pub fn acquire(lock_dir: &Path, account: Address) -> Result<Self, DeployError> {
        std::fs::create_dir_all(lock_dir)?;

        let path = lock_dir.join(format!("{account:#x}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        file.try_lock_exclusive()
            .map_err(|_| DeployError::CredentialBusy(account))?;

        tracing::debug!(path = %path.display(), %account, "Credential lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CredentialLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, path = %self.path.display(), "Failed to release credential lock");
        }
    }
}
