// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk credential store: one JSON slot file per authenticated identity.
//!
//! Slot files hold long-lived secrets and are written atomically
//! (unique tmp + rename) with owner-only permissions. The flat field
//! layout matches the predecessor tool's authorized-user files, so
//! existing credentials import without conversion.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// One stored credential, keyed by the account's email address.
///
/// The identity lives in the slot filename, not in the serialized body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Account email. Filled from the slot name on load; never serialized.
    #[serde(skip)]
    pub identity: String,
    /// Current access token (short-lived).
    pub token: String,
    /// Refresh token; empty when the provider withheld one.
    #[serde(default)]
    pub refresh_token: String,
    /// Token endpoint used to mint new access tokens.
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    /// Scopes granted at authorization time.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Absolute expiry of `token`.
    pub expiry: DateTime<Utc>,
}

/// Directory of credential slots.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, identity: &str) -> PathBuf {
        self.dir.join(format!("{identity}.json"))
    }

    /// Write the identity's slot, replacing any prior content.
    ///
    /// Creates the store directory on first use (owner-only). The write goes
    /// through a unique temp file so concurrent saves cannot interleave.
    pub fn save(&self, cred: &Credential) -> Result<(), AuthError> {
        validate_identity(&cred.identity)?;

        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|e| {
                AuthError::StoreIo(format!("cannot create {}: {e}", self.dir.display()))
            })?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(0o700));
            }
        }

        let json = serde_json::to_string_pretty(cred)
            .map_err(|e| AuthError::StoreIo(format!("cannot serialize credential: {e}")))?;

        let path = self.slot_path(&cred.identity);
        let tmp_path = unique_tmp_path(&path);
        write_owner_only(&tmp_path, &json)
            .map_err(|e| AuthError::StoreIo(format!("cannot write {}: {e}", tmp_path.display())))?;
        std::fs::rename(&tmp_path, &path)
            .map_err(|e| AuthError::StoreIo(format!("cannot replace {}: {e}", path.display())))?;
        Ok(())
    }

    /// Load the identity's slot.
    ///
    /// A missing slot is `NoCredentials` (recoverable by login), distinct
    /// from `StoreIo` for unreadable or unparseable slots.
    pub fn load(&self, identity: &str) -> Result<Credential, AuthError> {
        validate_identity(identity)?;
        let path = self.slot_path(identity);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::NoCredentials(identity.to_owned()));
            }
            Err(e) => {
                return Err(AuthError::StoreIo(format!("cannot read {}: {e}", path.display())));
            }
        };
        let mut cred: Credential = serde_json::from_str(&contents)
            .map_err(|e| AuthError::StoreIo(format!("cannot parse {}: {e}", path.display())))?;
        cred.identity = identity.to_owned();
        Ok(cred)
    }

    /// Every identity with a slot, ascending. A missing store directory is
    /// an empty store, not an error.
    pub fn list_identities(&self) -> Result<Vec<String>, AuthError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AuthError::StoreIo(format!("cannot list {}: {e}", self.dir.display())));
            }
        };

        let mut identities = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AuthError::StoreIo(e.to_string()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(identity) = name.strip_suffix(".json") {
                if !identity.is_empty() {
                    identities.push(identity.to_owned());
                }
            }
        }
        identities.sort();
        identities.dedup();
        Ok(identities)
    }

    /// First stored identity in lexical order, if any.
    pub fn default_identity(&self) -> Result<Option<String>, AuthError> {
        Ok(self.list_identities()?.into_iter().next())
    }

    /// Pure existence check for an identity's slot.
    pub fn has(&self, identity: &str) -> bool {
        validate_identity(identity).is_ok() && self.slot_path(identity).exists()
    }
}

/// Identities name slot files directly, so they must be safe path components.
fn validate_identity(identity: &str) -> Result<(), AuthError> {
    if identity.is_empty() {
        return Err(AuthError::StoreIo("identity must not be empty".to_owned()));
    }
    if identity.contains('/') || identity.contains('\\') || identity.starts_with('.') {
        return Err(AuthError::StoreIo(format!("identity {identity:?} is not a valid slot name")));
    }
    Ok(())
}

/// Unique temp filename (PID + counter) so concurrent saves never race on
/// the same `.tmp` file — a shorter write can leave trailing bytes from a
/// longer previous write.
fn unique_tmp_path(path: &Path) -> PathBuf {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    path.with_file_name(tmp_name)
}

/// Write `contents` readable by the owner only (the file holds secrets).
fn write_owner_only(path: &Path, contents: &str) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(contents.as_bytes())
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, contents)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
