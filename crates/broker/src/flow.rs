// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive OAuth authorization-code flow.
//!
//! One run drives a single end-to-end exchange: bind the local callback
//! listener, open the provider's consent page in the system browser, wait
//! for the redirect, exchange the code, resolve the authenticated identity,
//! persist the credential, and render a final page into the browser tab.
//!
//! The listener task and the waiting engine communicate over two
//! single-use oneshot channels owned by a [`CallbackBridge`]: redirect
//! parameters flow in, the attempt's outcome flows back out so the tab can
//! show what was actually saved.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::AuthError;
use crate::oauth;
use crate::resolver::LoginFlow;
use crate::store::{Credential, CredentialStore};

/// Fixed default port for the local callback listener.
pub const DEFAULT_CALLBACK_PORT: u16 = 8000;
/// Redirect path registered with the identity provider.
pub const CALLBACK_PATH: &str = "/oauth2callback";
/// Default deadline for the whole interactive attempt.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// How long the redirect handler waits for the attempt's outcome before
/// rendering a neutral page; code receipt and page render are decoupled so
/// the tab always gets a final page even while the exchange is finishing.
const RENDER_WAIT: Duration = Duration::from_secs(10);
/// Bound on listener teardown so an abandoned attempt cannot leak the port.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One interactive authorization-code exchange, end to end.
#[derive(Debug, Clone)]
pub struct OauthFlow {
    pub http: reqwest::Client,
    pub store: CredentialStore,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
    /// Listener port; 0 binds an ephemeral port (tests).
    pub port: u16,
    pub timeout: Duration,
}

impl LoginFlow for OauthFlow {
    async fn run(&self, cancel: &CancellationToken) -> Result<String, AuthError> {
        self.run_with_launcher(cancel, |url| {
            println!("Open this link in your browser to authorize access:\n\n  {url}\n");
            if let Err(e) = open::that(url) {
                tracing::warn!(err = %e, "could not launch a browser; use the printed link");
            }
        })
        .await
    }
}

impl OauthFlow {
    /// Run the flow with an explicit authorization-URL launcher.
    ///
    /// `launch` receives the full authorization URL once the listener is
    /// armed; the default launcher prints it and opens the system browser.
    pub async fn run_with_launcher<F>(
        &self,
        cancel: &CancellationToken,
        launch: F,
    ) -> Result<String, AuthError>
    where
        F: FnOnce(&str),
    {
        let listener = TcpListener::bind(("127.0.0.1", self.port)).await.map_err(|e| {
            AuthError::PortUnavailable { port: self.port, detail: e.to_string() }
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::PortUnavailable { port: self.port, detail: e.to_string() })?
            .port();
        let redirect_uri = format!("http://localhost:{port}{CALLBACK_PATH}");

        let state_token = oauth::generate_state();
        let (bridge, redirect_rx, outcome_tx) = CallbackBridge::channels();
        let router = callback_router(Arc::new(bridge));

        let server_cancel = CancellationToken::new();
        let serve =
            axum::serve(listener, router).with_graceful_shutdown(server_cancel.clone().cancelled_owned());
        let mut server = tokio::spawn(async move {
            if let Err(e) = serve.await {
                tracing::warn!(err = %e, "callback listener error");
            }
        });
        tracing::debug!(port, "oauth callback listener armed");

        let authorize_url = oauth::build_auth_url(
            &self.auth_url,
            &self.client_id,
            &redirect_uri,
            &self.scopes.join(" "),
            &state_token,
        );
        launch(&authorize_url);

        let deadline = tokio::time::Instant::now() + self.timeout;
        let result = self.complete(redirect_rx, deadline, cancel, &state_token, &redirect_uri).await;

        // Hand the outcome to the waiting redirect handler (if any) so the
        // browser tab renders what actually happened, then tear down.
        let _ = outcome_tx.send(match &result {
            Ok(identity) => Ok(identity.clone()),
            Err(e) => Err(e.to_string()),
        });
        server_cancel.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
            server.abort();
            tracing::warn!(port, "callback listener teardown timed out");
        }

        result
    }

    /// Wait for the redirect, exchange the code, resolve the identity, persist.
    async fn complete(
        &self,
        redirect_rx: oneshot::Receiver<RedirectParams>,
        deadline: tokio::time::Instant,
        cancel: &CancellationToken,
        state_token: &str,
        redirect_uri: &str,
    ) -> Result<String, AuthError> {
        let params = tokio::select! {
            delivered = redirect_rx => delivered.map_err(|_| {
                AuthError::ProviderIo("redirect channel closed before delivery".to_owned())
            })?,
            _ = tokio::time::sleep_until(deadline) => return Err(AuthError::Timeout),
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
        };

        // The state token is consumed here, match or not: the bridge only
        // ever delivers one request, so a replay never reaches this point.
        if params.state.as_deref() != Some(state_token) {
            return Err(AuthError::CsrfMismatch);
        }
        if let Some(error) = params.error {
            let detail = match params.error_description {
                Some(description) => format!("{error}: {description}"),
                None => error,
            };
            return Err(AuthError::ProviderDenied(detail));
        }
        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::ProviderIo("redirect carried no authorization code".to_owned()))?;

        // From here on the attempt runs to completion on its own terms;
        // aborting mid-exchange would leave a half-consumed code behind.
        let token = oauth::exchange_code(
            &self.http,
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            &code,
            redirect_uri,
        )
        .await?;

        let identity = oauth::fetch_identity(&self.http, &self.userinfo_url, &token.access_token).await?;

        let granted = match token.scope.as_deref() {
            Some(scope) if !scope.is_empty() => {
                scope.split_whitespace().map(str::to_owned).collect()
            }
            _ => self.scopes.clone(),
        };
        let record = Credential {
            identity: identity.clone(),
            token: token.access_token,
            refresh_token: token.refresh_token.unwrap_or_default(),
            token_uri: self.token_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes: granted,
            expiry: oauth::expiry_after(token.expires_in),
        };
        if record.refresh_token.is_empty() {
            tracing::warn!(account = %identity, "provider withheld a refresh token; access ends at expiry");
        }
        self.store.save(&record)?;
        tracing::info!(account = %identity, "credentials stored");
        Ok(identity)
    }
}

/// Query parameters delivered by the provider's redirect.
#[derive(Debug)]
pub(crate) struct RedirectParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl RedirectParams {
    fn from_query(mut query: HashMap<String, String>) -> Self {
        Self {
            state: query.remove("state"),
            code: query.remove("code"),
            error: query.remove("error"),
            error_description: query.remove("error_description"),
        }
    }
}

/// State object behind the redirect handler: owns both signal channels so
/// the handler closure captures nothing mutable of its own.
pub(crate) struct CallbackBridge {
    redirect_tx: Mutex<Option<oneshot::Sender<RedirectParams>>>,
    outcome_rx: Mutex<Option<oneshot::Receiver<Result<String, String>>>>,
}

impl CallbackBridge {
    /// Build the bridge plus the engine's ends of its two channels.
    pub(crate) fn channels(
    ) -> (Self, oneshot::Receiver<RedirectParams>, oneshot::Sender<Result<String, String>>) {
        let (redirect_tx, redirect_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let bridge = Self {
            redirect_tx: Mutex::new(Some(redirect_tx)),
            outcome_rx: Mutex::new(Some(outcome_rx)),
        };
        (bridge, redirect_rx, outcome_tx)
    }

    /// Deliver one redirect to the engine and render the outcome page.
    ///
    /// Only the first request takes the sender; later hits on the callback
    /// path get a static page and are never forwarded.
    async fn deliver(&self, query: HashMap<String, String>) -> Html<String> {
        let Some(tx) = self.redirect_tx.lock().await.take() else {
            return page("Already handled", "This sign-in attempt was already processed. You can close this tab.");
        };
        let outcome_rx = self.outcome_rx.lock().await.take();
        let _ = tx.send(RedirectParams::from_query(query));

        let Some(rx) = outcome_rx else {
            return page("Sign-in received", "You can close this tab and return to the terminal.");
        };
        match tokio::time::timeout(RENDER_WAIT, rx).await {
            Ok(Ok(Ok(identity))) => page(
                "Authentication successful",
                &format!("Signed in as {}. You can close this tab and return to the terminal.", escape(&identity)),
            ),
            Ok(Ok(Err(detail))) => page(
                "Authentication failed",
                &format!("{}. Check the terminal for details.", escape(&detail)),
            ),
            _ => page(
                "Sign-in is still completing",
                "You can close this tab; the terminal will report the result.",
            ),
        }
    }
}

pub(crate) fn callback_router(bridge: Arc<CallbackBridge>) -> Router {
    Router::new().route(CALLBACK_PATH, get(callback)).with_state(bridge)
}

async fn callback(
    State(bridge): State<Arc<CallbackBridge>>,
    Query(query): Query<HashMap<String, String>>,
) -> Html<String> {
    bridge.deliver(query).await
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>gwbroker</title></head>\n\
         <body style=\"font-family: system-ui; text-align: center; padding-top: 80px;\">\n\
         <h2>{title}</h2>\n<p>{body}</p>\n</body>\n</html>"
    ))
}

/// Values interpolated into the outcome page come from the provider.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;
