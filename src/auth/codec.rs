// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Opaque token codec.
//!
//! A bearer value has exactly one shape: `"<id>|<secret>"`. The id selects
//! the token row; the secret is hashed with SHA-256 and compared against the
//! stored digest. Only the digest is ever persisted.

use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use super::abilities::Abilities;

/// Random bytes per secret (256 bits of entropy).
const SECRET_BYTES: usize = 32;

/// Separator between the row id and the secret.
const BEARER_SEPARATOR: char = '|';

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("bearer value has no '|' separator")]
    MissingSeparator,

    #[error("bearer id is not a non-negative integer")]
    InvalidId,

    #[error("bearer secret is empty")]
    EmptySecret,

    #[error("system random source failed")]
    Random,

    #[error("invalid ability list: {0}")]
    Abilities(#[from] serde_json::Error),
}

/// Generate a fresh token secret from the system CSPRNG.
pub fn generate_secret() -> Result<String, CodecError> {
    let mut bytes = [0u8; SECRET_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| CodecError::Random)?;
    Ok(hex::encode(bytes))
}

/// SHA-256 digest of a secret, hex encoded.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Build the bearer value returned to the client.
pub fn format_bearer(id: u64, secret: &str) -> String {
    format!("{id}{BEARER_SEPARATOR}{secret}")
}

/// Split a bearer value on the first `|` into `(id, secret)`.
pub fn parse_bearer(value: &str) -> Result<(u64, &str), CodecError> {
    let (id, secret) = value
        .split_once(BEARER_SEPARATOR)
        .ok_or(CodecError::MissingSeparator)?;

    // u64::from_str accepts a leading '+', which is not part of the format
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::InvalidId);
    }
    let id = id.parse::<u64>().map_err(|_| CodecError::InvalidId)?;

    if secret.is_empty() {
        return Err(CodecError::EmptySecret);
    }

    Ok((id, secret))
}

/// Serialize an ability set for storage. The empty set encodes as `[]`.
pub fn encode_abilities(abilities: &Abilities) -> Result<String, CodecError> {
    Ok(serde_json::to_string(abilities)?)
}

/// Decode a stored ability list. Blank and `null` columns decode to the empty set.
pub fn decode_abilities(serialized: &str) -> Result<Abilities, CodecError> {
    let trimmed = serialized.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Abilities::new());
    }
    let list: Vec<String> = serde_json::from_str(trimmed)?;
    Ok(list.into_iter().collect())
}
