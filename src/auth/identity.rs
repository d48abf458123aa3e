// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request-scoped identity attached by the authentication middleware.
//!
//! Both types travel as typed request extensions, so lookups are keyed by
//! type rather than by string.

use super::TokenKind;

/// Identity of the caller behind a live bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Owning user id (never zero)
    pub user_id: u64,
    /// Row id of the presented token
    pub token_id: u64,
    pub kind: TokenKind,
}

/// The already-parsed bearer, handed from authentication to the ability gate
/// so the gate does not re-parse or re-hash the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedBearer {
    pub token_id: u64,
    pub hashed_secret: String,
}
