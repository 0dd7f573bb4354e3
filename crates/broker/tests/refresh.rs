// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh-on-load behavior against a stub token endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{TimeDelta, Utc};
use serde_json::json;

use gwbroker::error::AuthError;
use gwbroker::refresh::{ensure_fresh, is_expired};
use gwbroker::store::{Credential, CredentialStore};

async fn spawn_app(router: Router) -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(format!("http://{addr}"))
}

fn refresh_router(calls: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/token",
        post(move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Json(json!({"access_token": "at-2", "expires_in": 3600, "token_type": "Bearer"}))
            }
        }),
    )
}

/// Build an HTTP client after ensuring the process-wide rustls crypto
/// provider is installed (reqwest uses `rustls-no-provider`). Idempotent.
fn http_client() -> reqwest::Client {
    let _ = rustls::crypto::ring::default_provider().install_default();
    reqwest::Client::new()
}

fn credential(identity: &str, token_uri: &str, expires_in_secs: i64) -> Credential {
    Credential {
        identity: identity.to_owned(),
        token: "at-1".to_owned(),
        refresh_token: "rt-1".to_owned(),
        token_uri: format!("{token_uri}/token"),
        client_id: "client-123".to_owned(),
        client_secret: "secret-456".to_owned(),
        scopes: vec!["scope.a".to_owned()],
        expiry: Utc::now() + TimeDelta::seconds(expires_in_secs),
    }
}

#[tokio::test]
async fn valid_token_returned_unchanged_without_endpoint_call() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = CredentialStore::new(dir.path().to_path_buf());
    let http = http_client();

    // Unroutable token endpoint: a call would fail the test.
    let cred = credential("user@example.com", "http://127.0.0.1:9", 3600);
    store.save(&cred)?;

    let fresh = ensure_fresh(&http, &store, cred.clone()).await?;
    assert_eq!(fresh, cred);
    Ok(())
}

#[tokio::test]
async fn expired_token_is_refreshed_and_persisted() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = CredentialStore::new(dir.path().to_path_buf());
    let http = http_client();
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = spawn_app(refresh_router(calls.clone())).await?;

    let cred = credential("user@example.com", &provider, -60);
    store.save(&cred)?;
    assert!(is_expired(&cred, Utc::now()));

    let fresh = ensure_fresh(&http, &store, cred.clone()).await?;
    assert_eq!(fresh.token, "at-2");
    // The endpoint withheld a rotated refresh token; the stored one survives.
    assert_eq!(fresh.refresh_token, "rt-1");
    assert!(fresh.expiry > cred.expiry);
    assert!(!is_expired(&fresh, Utc::now()));

    // The refreshed access token and later expiry were persisted.
    let reloaded = store.load("user@example.com")?;
    assert_eq!(reloaded.token, "at-2");
    assert!(reloaded.expiry > cred.expiry);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Refresh is idempotent: the now-valid record passes through untouched.
    let again = ensure_fresh(&http, &store, fresh.clone()).await?;
    assert_eq!(again, fresh);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_is_refresh_failed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = CredentialStore::new(dir.path().to_path_buf());
    let http = http_client();

    let router = Router::new().route(
        "/token",
        post(|| async {
            (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"})))
        }),
    );
    let provider = spawn_app(router).await?;

    let cred = credential("user@example.com", &provider, -60);
    store.save(&cred)?;

    match ensure_fresh(&http, &store, cred).await {
        Err(AuthError::RefreshFailed(detail)) => assert!(detail.contains("invalid_grant")),
        other => anyhow::bail!("expected RefreshFailed, got {other:?}"),
    }
    // The stale record is left as it was.
    assert_eq!(store.load("user@example.com")?.token, "at-1");
    Ok(())
}

#[tokio::test]
async fn missing_refresh_token_fails_without_a_request() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = CredentialStore::new(dir.path().to_path_buf());
    let http = http_client();

    let mut cred = credential("user@example.com", "http://127.0.0.1:9", -60);
    cred.refresh_token = String::new();

    match ensure_fresh(&http, &store, cred).await {
        Err(AuthError::RefreshFailed(detail)) => assert!(detail.contains("user@example.com")),
        other => anyhow::bail!("expected RefreshFailed, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn failed_persist_still_returns_the_fresh_token() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = spawn_app(refresh_router(calls.clone())).await?;
    let http = http_client();

    // A store rooted under a regular file cannot be created or written.
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory")?;
    let store = CredentialStore::new(blocker.join("credentials"));

    let cred = credential("user@example.com", &provider, -60);
    let fresh = ensure_fresh(&http, &store, cred).await?;
    assert_eq!(fresh.token, "at-2");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}
