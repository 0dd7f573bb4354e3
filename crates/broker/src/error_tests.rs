// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn codes_are_stable() -> anyhow::Result<()> {
    assert_eq!(AuthError::NoCredentials("a@x.com".into()).code(), "NO_CREDENTIALS");
    assert_eq!(AuthError::NoAccounts.code(), "NO_ACCOUNTS");
    assert_eq!(AuthError::Timeout.code(), "TIMEOUT");
    assert_eq!(
        AuthError::WrongAccount { requested: "a".into(), resolved: "b".into() }.code(),
        "WRONG_ACCOUNT",
    );
    Ok(())
}

#[test]
fn login_guidance_is_actionable() -> anyhow::Result<()> {
    let e = AuthError::NeedsLogin("a@x.com".into());
    assert!(e.needs_login());
    assert!(e.to_string().contains("gwbroker login --account a@x.com"));

    let e = AuthError::NoAccounts;
    assert!(e.needs_login());
    assert!(e.to_string().contains("gwbroker login"));

    assert!(!AuthError::Timeout.needs_login());
    assert!(!AuthError::RefreshFailed("revoked".into()).needs_login());
    Ok(())
}
