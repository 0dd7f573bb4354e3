// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use crate::flow::{DEFAULT_CALLBACK_PORT, DEFAULT_LOGIN_TIMEOUT};

/// Configuration for the credential broker.
#[derive(Debug, Clone, clap::Args)]
pub struct BrokerConfig {
    /// Directory holding one credential file per account.
    #[arg(long, env = "GWBROKER_CREDENTIALS_DIR")]
    pub credentials_dir: Option<PathBuf>,

    /// Port for the local oauth callback listener.
    #[arg(long, default_value_t = DEFAULT_CALLBACK_PORT, env = "GWBROKER_OAUTH_PORT")]
    pub oauth_port: u16,

    /// Seconds to wait for the browser redirect before giving up.
    #[arg(long, default_value_t = DEFAULT_LOGIN_TIMEOUT.as_secs(), env = "GWBROKER_LOGIN_TIMEOUT_SECS")]
    pub login_timeout_secs: u64,

    /// OAuth client id of the registered application.
    #[arg(long, env = "GOOGLE_OAUTH_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth client secret of the registered application.
    #[arg(long, env = "GOOGLE_OAUTH_CLIENT_SECRET")]
    pub client_secret: Option<String>,
}

impl BrokerConfig {
    /// Credential directory: explicit override, else the state-dir cascade.
    pub fn credentials_dir(&self) -> PathBuf {
        match &self.credentials_dir {
            Some(dir) => dir.clone(),
            None => default_credentials_dir(),
        }
    }

    pub fn login_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.login_timeout_secs)
    }

    /// Interactive login needs the application's registered credentials.
    pub fn validate_for_login(&self) -> Result<(), String> {
        if self.client_id.as_deref().unwrap_or_default().is_empty() {
            return Err("missing oauth client id (set GOOGLE_OAUTH_CLIENT_ID or --client-id)".into());
        }
        if self.client_secret.as_deref().unwrap_or_default().is_empty() {
            return Err(
                "missing oauth client secret (set GOOGLE_OAUTH_CLIENT_SECRET or --client-secret)"
                    .into(),
            );
        }
        if self.login_timeout_secs == 0 {
            return Err("login timeout must be at least 1 second".into());
        }
        Ok(())
    }
}

/// Resolve the default credential directory.
///
/// Checks `$XDG_STATE_HOME/gwbroker/credentials`, then
/// `$HOME/.local/state/gwbroker/credentials`.
pub fn default_credentials_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("gwbroker/credentials");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/gwbroker/credentials");
    }
    PathBuf::from(".gwbroker/credentials")
}
