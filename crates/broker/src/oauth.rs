// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth wire types and provider endpoint calls.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Google authorization endpoint (browser redirect target).
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
/// Google token endpoint (code exchange and refresh).
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Google userinfo endpoint (resolves the authenticated email).
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Scopes requested at login: the seven Workspace services, plus the email
/// scope the identity-resolution step depends on.
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/documents",
    "https://www.googleapis.com/auth/tasks",
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/contacts",
    "https://www.googleapis.com/auth/userinfo.email",
];

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    /// Space-separated granted scopes, when the provider reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Userinfo response; only the email is needed.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub verified_email: Option<bool>,
}

/// Generate a random CSRF state token (32 bytes, base64url).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Absolute expiry for a token valid for `expires_in` seconds from now.
pub fn expiry_after(expires_in: u64) -> DateTime<Utc> {
    Utc::now() + TimeDelta::seconds(i64::try_from(expires_in).unwrap_or(3600))
}

/// Build the full authorization URL.
///
/// `access_type=offline` and `prompt=consent` make Google issue a refresh
/// token instead of only a short-lived access token.
pub fn build_auth_url(
    auth_url: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    state: &str,
) -> String {
    format!(
        "{auth_url}?client_id={client_id}\
         &redirect_uri={redirect_uri}\
         &response_type=code\
         &scope={scope}\
         &state={state}\
         &access_type=offline\
         &prompt=consent",
        client_id = urlencoding(client_id),
        redirect_uri = urlencoding(redirect_uri),
        scope = urlencoding(scope),
        state = urlencoding(state),
    )
}

/// Exchange an authorization code for tokens at the token endpoint.
pub async fn exchange_code(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenResponse, AuthError> {
    let resp = client
        .post(token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await
        .map_err(|e| AuthError::ProviderIo(format!("token exchange request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(AuthError::ProviderIo(format!("token exchange failed ({status}): {text}")));
    }

    resp.json()
        .await
        .map_err(|e| AuthError::ProviderIo(format!("cannot parse token response: {e}")))
}

/// Mint a new access token from a refresh token.
///
/// A transport failure is `ProviderIo`; a rejection by the endpoint (revoked
/// or invalid grant) is `RefreshFailed`.
pub async fn refresh_grant(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenResponse, AuthError> {
    let resp = client
        .post(token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await
        .map_err(|e| AuthError::ProviderIo(format!("refresh request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(AuthError::RefreshFailed(format!("token endpoint rejected refresh ({status}): {text}")));
    }

    resp.json()
        .await
        .map_err(|e| AuthError::ProviderIo(format!("cannot parse refresh response: {e}")))
}

/// Resolve the authenticated identity for a freshly minted access token.
///
/// The flow is identity-agnostic at launch: the user may pick any account in
/// the browser, so the email is only discoverable once a token exists.
pub async fn fetch_identity(
    client: &reqwest::Client,
    userinfo_url: &str,
    access_token: &str,
) -> Result<String, AuthError> {
    let resp = client
        .get(userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| AuthError::ProviderIo(format!("userinfo request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(AuthError::ProviderIo(format!("userinfo failed ({status}): {text}")));
    }

    let info: UserInfo = resp
        .json()
        .await
        .map_err(|e| AuthError::ProviderIo(format!("cannot parse userinfo response: {e}")))?;

    if info.email.is_empty() {
        return Err(AuthError::ProviderIo("userinfo response carried no email".to_owned()));
    }
    Ok(info.email)
}

/// Percent-encode a URL query value (spaces as `+`).
fn urlencoding(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0xf) as usize]));
            }
        }
    }
    out
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

#[cfg(test)]
#[path = "oauth_tests.rs"]
mod tests;
