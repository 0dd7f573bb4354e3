// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account resolution: one identity in, one live credential out.
//!
//! The [`Broker`] is the per-process manager object; it owns the store, the
//! shared HTTP client, and the single-flight lock that keeps interactive
//! logins from racing into two simultaneous browser flows.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::BrokerConfig;
use crate::error::AuthError;
use crate::flow::OauthFlow;
use crate::oauth;
use crate::refresh;
use crate::store::{Credential, CredentialStore};

/// Seam between the resolver and the interactive flow; tests inject stubs.
///
/// A run performs the whole browser round trip, persists the credential it
/// obtained, and returns the resolved identity.
pub trait LoginFlow {
    async fn run(&self, cancel: &CancellationToken) -> Result<String, AuthError>;
}

/// Per-process credential broker.
pub struct Broker {
    config: BrokerConfig,
    store: CredentialStore,
    http: reqwest::Client,
    /// Serializes interactive flows: two listeners would collide on the
    /// callback port or make the printed authorization URL ambiguous.
    login_lock: Mutex<()>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        // reqwest is built with the `rustls-no-provider` feature, so the
        // process-wide rustls crypto provider must be installed before any
        // client is constructed. Idempotent: later calls are a no-op.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let store = CredentialStore::new(config.credentials_dir());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { config, store, http, login_lock: Mutex::new(()) }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Resolve a live, refreshed credential for exactly one identity.
    ///
    /// `interactive` is false in automated/server contexts: a miss then
    /// fails with actionable guidance instead of opening a browser.
    pub async fn resolve(
        &self,
        hint: Option<&str>,
        interactive: bool,
        cancel: &CancellationToken,
    ) -> Result<Credential, AuthError> {
        let flow = self.login_flow();
        self.resolve_with(hint, interactive, &flow, cancel).await
    }

    /// [`resolve`](Self::resolve) with an injected flow implementation.
    pub async fn resolve_with<F: LoginFlow>(
        &self,
        hint: Option<&str>,
        interactive: bool,
        flow: &F,
        cancel: &CancellationToken,
    ) -> Result<Credential, AuthError> {
        match hint {
            Some(identity) => match self.load_fresh(identity).await {
                Ok(cred) => Ok(cred),
                Err(AuthError::NoCredentials(_)) if !interactive => {
                    Err(AuthError::NeedsLogin(identity.to_owned()))
                }
                Err(AuthError::NoCredentials(_)) => {
                    let _guard = self.login_lock.lock().await;
                    // Another caller may have logged this account in while
                    // we waited on the lock.
                    if !self.store.has(identity) {
                        let resolved = flow.run(cancel).await?;
                        if resolved != identity {
                            return Err(AuthError::WrongAccount {
                                requested: identity.to_owned(),
                                resolved,
                            });
                        }
                    }
                    self.load_fresh(identity).await
                }
                Err(e) => Err(e),
            },
            None => match self.store.default_identity()? {
                Some(identity) => self.load_fresh(&identity).await,
                None if !interactive => Err(AuthError::NoAccounts),
                None => {
                    let _guard = self.login_lock.lock().await;
                    let identity = match self.store.default_identity()? {
                        // A concurrent login already produced a default.
                        Some(identity) => identity,
                        None => flow.run(cancel).await?,
                    };
                    self.load_fresh(&identity).await
                }
            },
        }
    }

    /// Interactive login; returns the authenticated identity.
    pub async fn login(
        &self,
        hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        let cred = self.resolve(hint, true, cancel).await?;
        Ok(cred.identity)
    }

    /// Entry point for the API tool handlers: an authenticated transport
    /// handle for exactly one identity, or an [`AuthError`] telling the
    /// caller what to do about it.
    pub async fn authorized_client(
        &self,
        hint: Option<&str>,
        interactive: bool,
        cancel: &CancellationToken,
    ) -> Result<AuthorizedClient, AuthError> {
        let cred = self.resolve(hint, interactive, cancel).await?;
        Ok(AuthorizedClient {
            identity: cred.identity,
            access_token: cred.token,
            http: self.http.clone(),
        })
    }

    async fn load_fresh(&self, identity: &str) -> Result<Credential, AuthError> {
        let cred = self.store.load(identity)?;
        refresh::ensure_fresh(&self.http, &self.store, cred).await
    }

    fn login_flow(&self) -> OauthFlow {
        OauthFlow {
            http: self.http.clone(),
            store: self.store.clone(),
            client_id: self.config.client_id.clone().unwrap_or_default(),
            client_secret: self.config.client_secret.clone().unwrap_or_default(),
            auth_url: oauth::GOOGLE_AUTH_URL.to_owned(),
            token_url: oauth::GOOGLE_TOKEN_URL.to_owned(),
            userinfo_url: oauth::GOOGLE_USERINFO_URL.to_owned(),
            scopes: oauth::DEFAULT_SCOPES.iter().map(|s| (*s).to_owned()).collect(),
            port: self.config.oauth_port,
            timeout: self.config.login_timeout(),
        }
    }
}

/// Authenticated HTTP handle for one identity.
pub struct AuthorizedClient {
    identity: String,
    access_token: String,
    http: reqwest::Client,
}

impl AuthorizedClient {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Start a request with the bearer token applied.
    pub fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.access_token)
    }

    /// GET a JSON document from an API endpoint.
    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value, AuthError> {
        let resp = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| AuthError::ProviderIo(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::ProviderIo(e.to_string()))?;
        resp.json().await.map_err(|e| AuthError::ProviderIo(e.to_string()))
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
