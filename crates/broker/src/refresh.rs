// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh-on-load: every credential handed to a caller goes through here.
//!
//! Refresh is strictly on-demand and unretried; it is the designed remedy
//! for ordinary expiry, not a failure path.

use chrono::{DateTime, Utc};

use crate::error::AuthError;
use crate::oauth;
use crate::store::{Credential, CredentialStore};

/// Whether the cached access token may still be used as-is.
pub fn is_expired(cred: &Credential, now: DateTime<Utc>) -> bool {
    cred.expiry <= now
}

/// Return a live credential: unchanged while the access token is valid,
/// otherwise re-minted via the refresh grant.
///
/// A refreshed token is persisted best-effort; the caller already holds a
/// usable in-memory token, so a failed write only logs a warning. An empty
/// stored refresh token surfaces `RefreshFailed` rather than retrying.
pub async fn ensure_fresh(
    http: &reqwest::Client,
    store: &CredentialStore,
    cred: Credential,
) -> Result<Credential, AuthError> {
    if !is_expired(&cred, Utc::now()) {
        return Ok(cred);
    }
    if cred.refresh_token.is_empty() {
        return Err(AuthError::RefreshFailed(format!(
            "no refresh token stored for {}",
            cred.identity
        )));
    }

    let token = oauth::refresh_grant(
        http,
        &cred.token_uri,
        &cred.client_id,
        &cred.client_secret,
        &cred.refresh_token,
    )
    .await?;

    let mut updated = cred.clone();
    updated.token = token.access_token;
    if let Some(rotated) = token.refresh_token {
        if !rotated.is_empty() {
            updated.refresh_token = rotated;
        }
    }
    updated.expiry = oauth::expiry_after(token.expires_in);

    if updated.token != cred.token {
        if let Err(e) = store.save(&updated) {
            tracing::warn!(
                account = %updated.identity,
                err = %e,
                "could not persist refreshed token; continuing with the in-memory token"
            );
        }
    }
    tracing::debug!(account = %updated.identity, "access token refreshed");
    Ok(updated)
}
