// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Salted password hashing (bcrypt).
//!
//! bcrypt is deliberately slow, so both operations run on the blocking pool
//! rather than on an executor thread.

use std::sync::OnceLock;

/// Lowest work factor accepted from configuration.
pub const MIN_COST: u32 = 10;

/// Work factor used when none is configured.
pub const DEFAULT_COST: u32 = 12;

/// bcrypt only reads this many bytes of input.
pub const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Hash a plaintext password with a fresh salt.
///
/// Fails instead of truncating input longer than [`MAX_PASSWORD_BYTES`].
pub async fn hash(password: &str, cost: u32) -> Result<String, PasswordError> {
    let password = password.to_owned();
    let hashed =
        tokio::task::spawn_blocking(move || bcrypt::non_truncating_hash(password, cost)).await??;
    Ok(hashed)
}

/// Check a plaintext password against a stored hash.
///
/// bcrypt compares digests in constant time.
pub async fn verify(password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
    let password = password.to_owned();
    let stored_hash = stored_hash.to_owned();
    let matches =
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &stored_hash)).await??;
    Ok(matches)
}

/// Burn one verification against a throwaway hash.
///
/// Called when the e-mail is unknown so that login takes about as long as it
/// does for a wrong password.
pub async fn verify_dummy(password: &str, cost: u32) {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

    let password = password.to_owned();
    let _ = tokio::task::spawn_blocking(move || {
        let dummy = DUMMY_HASH.get_or_init(|| bcrypt::hash("storefront-dummy-password", cost).ok());
        if let Some(dummy) = dummy {
            let _ = bcrypt::verify(password, dummy);
        }
    })
    .await;
}
