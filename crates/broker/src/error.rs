// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure taxonomy for credential resolution and login.

use std::fmt;

/// Terminal failure conditions of the auth subsystem.
///
/// Every variant ends the operation that raised it; the only designed
/// recovery is an explicit refresh (for expiry) or a new login (for
/// `NoCredentials`/`NoAccounts`/`NeedsLogin`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No slot stored for this identity.
    NoCredentials(String),
    /// The store holds no identities at all.
    NoAccounts,
    /// A non-interactive caller asked for an identity that is not stored.
    NeedsLogin(String),
    /// Interactive login completed, but for a different account than requested.
    WrongAccount { requested: String, resolved: String },
    /// The redirect carried a `state` other than the one generated for this attempt.
    CsrfMismatch,
    /// The provider reported an error on the redirect (user denied consent, etc).
    ProviderDenied(String),
    /// No redirect arrived before the login deadline.
    Timeout,
    /// The caller's cancellation signal fired while awaiting the redirect.
    Cancelled,
    /// The stored refresh token no longer mints access tokens (or was never stored).
    RefreshFailed(String),
    /// The local callback listener could not bind its port.
    PortUnavailable { port: u16, detail: String },
    /// Credential store I/O or parse failure (distinct from a missing slot).
    StoreIo(String),
    /// Provider transport or response-parsing failure.
    ProviderIo(String),
}

impl AuthError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCredentials(_) => "NO_CREDENTIALS",
            Self::NoAccounts => "NO_ACCOUNTS",
            Self::NeedsLogin(_) => "NEEDS_LOGIN",
            Self::WrongAccount { .. } => "WRONG_ACCOUNT",
            Self::CsrfMismatch => "CSRF_MISMATCH",
            Self::ProviderDenied(_) => "PROVIDER_DENIED",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::RefreshFailed(_) => "REFRESH_FAILED",
            Self::PortUnavailable { .. } => "PORT_UNAVAILABLE",
            Self::StoreIo(_) => "STORE_IO",
            Self::ProviderIo(_) => "PROVIDER_IO",
        }
    }

    /// True for conditions a caller can clear by running `gwbroker login`.
    pub fn needs_login(&self) -> bool {
        matches!(self, Self::NoCredentials(_) | Self::NoAccounts | Self::NeedsLogin(_))
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials(identity) => {
                write!(f, "no stored credentials for {identity}")
            }
            Self::NoAccounts => {
                write!(f, "no authenticated accounts; run `gwbroker login` to add one")
            }
            Self::NeedsLogin(identity) => {
                write!(
                    f,
                    "no stored credentials for {identity}; run `gwbroker login --account {identity}`"
                )
            }
            Self::WrongAccount { requested, resolved } => {
                write!(f, "authenticated as {resolved}, but {requested} was requested")
            }
            Self::CsrfMismatch => {
                write!(f, "oauth redirect carried an unexpected state token")
            }
            Self::ProviderDenied(reason) => {
                write!(f, "authorization denied by the provider: {reason}")
            }
            Self::Timeout => write!(f, "timed out waiting for the oauth redirect"),
            Self::Cancelled => write!(f, "login cancelled"),
            Self::RefreshFailed(detail) => write!(f, "token refresh failed: {detail}"),
            Self::PortUnavailable { port, detail } => {
                write!(f, "cannot bind oauth callback port {port}: {detail}")
            }
            Self::StoreIo(detail) => write!(f, "credential store error: {detail}"),
            Self::ProviderIo(detail) => write!(f, "provider request failed: {detail}"),
        }
    }
}

impl std::error::Error for AuthError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
