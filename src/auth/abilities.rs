// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token kinds and the ability sets carried by each token.
//!
//! Abilities are free-form strings compared by exact match. There is no
//! wildcard and no hierarchy: a token either carries the string a route
//! requires or it does not.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Ability granted to access tokens for ordinary API calls.
pub const ACCESS_API: &str = "access-api";

/// Ability granted to refresh tokens; only the refresh endpoint accepts it.
pub const REFRESH_TOKEN: &str = "refresh-token";

/// The kind of a token row, persisted as the row's `name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived bearer for ordinary API calls
    AccessToken,
    /// Long-lived bearer used solely to mint a new access token
    RefreshToken,
}

impl TokenKind {
    /// Name stored alongside the token row.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::AccessToken => "access_token",
            TokenKind::RefreshToken => "refresh_token",
        }
    }

    /// Parse a stored token name.
    pub fn from_name(name: &str) -> Option<TokenKind> {
        match name {
            "access_token" => Some(TokenKind::AccessToken),
            "refresh_token" => Some(TokenKind::RefreshToken),
            _ => None,
        }
    }

    /// Fixed ability set issued with every token of this kind.
    pub fn abilities(&self) -> Abilities {
        match self {
            TokenKind::AccessToken => Abilities::from_iter([ACCESS_API]),
            TokenKind::RefreshToken => Abilities::from_iter([REFRESH_TOKEN]),
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unordered set of ability strings attached to a token.
///
/// Serializes as a JSON array (sorted, deduplicated). The empty set
/// serializes as `[]`, never `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Abilities(BTreeSet<String>);

impl Abilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, ability: &str) -> bool {
        self.0.contains(ability)
    }

    /// First required ability this set does not carry, if any.
    pub fn first_missing<'a, I>(&self, required: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        required.into_iter().find(|ability| !self.contains(ability))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<S: Into<String>> FromIterator<S> for Abilities {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Abilities(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_kind_names_round_trip() {
        for kind in [TokenKind::AccessToken, TokenKind::RefreshToken] {
            assert_eq!(TokenKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(TokenKind::from_name("personal"), None);
    }

    #[test]
    fn token_kinds_carry_distinct_abilities() {
        assert!(TokenKind::AccessToken.abilities().contains(ACCESS_API));
        assert!(!TokenKind::AccessToken.abilities().contains(REFRESH_TOKEN));
        assert!(TokenKind::RefreshToken.abilities().contains(REFRESH_TOKEN));
        assert!(!TokenKind::RefreshToken.abilities().contains(ACCESS_API));
    }

    #[test]
    fn first_missing_uses_exact_match() {
        let abilities = Abilities::from_iter(["orders:read"]);
        assert_eq!(abilities.first_missing(["orders:read"]), None);
        assert_eq!(abilities.first_missing(["orders"]), Some("orders"));
        assert_eq!(
            abilities.first_missing(["orders:read", "orders:write"]),
            Some("orders:write")
        );
    }

    #[test]
    fn duplicates_collapse() {
        let abilities = Abilities::from_iter(["a", "b", "a"]);
        assert_eq!(abilities.len(), 2);
    }
}
