// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistence boundary for the authentication core. Each collaborator is a
//! narrow trait so the [`Authenticator`](crate::auth::Authenticator) can run
//! against any backend:
//!
//! - [`CredentialStore`] - user records with salted password hashes
//! - [`RoleStore`] - seeded role rows looked up by name
//! - [`TokenStore`] - token rows holding only the SHA-256 digest of the secret
//!
//! Two backends implement all three:
//!
//! - [`AuthDatabase`] - embedded redb database (production)
//! - [`InMemoryStore`] - process-local maps (tests, local development)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Abilities, TokenKind};

pub mod database;
pub mod memory;

pub use database::AuthDatabase;
pub use memory::InMemoryStore;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid stored value: {0}")]
    Corrupt(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("write abandoned by caller")]
    Abandoned,
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Records
// =============================================================================

/// Persisted user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    /// Public-facing identifier
    pub uuid: Uuid,
    pub name: String,
    /// Unique, stored lowercase
    pub email: String,
    /// bcrypt hash; the plaintext is never stored
    pub password_hash: String,
    pub role_id: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User about to be inserted; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uuid: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: u64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted token row.
///
/// Only the digest of the secret lives here. Abilities never change after
/// the row is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: u64,
    pub owner_id: u64,
    pub kind: TokenKind,
    pub hashed_secret: String,
    pub abilities: Abilities,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Token {
    /// A token is live strictly before its expiry instant.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Token row about to be inserted; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewToken {
    pub owner_id: u64,
    pub kind: TokenKind,
    pub hashed_secret: String,
    pub abilities: Abilities,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewToken {
    pub(crate) fn into_token(self, id: u64) -> Token {
        Token {
            id,
            owner_id: self.owner_id,
            kind: self.kind,
            hashed_secret: self.hashed_secret,
            abilities: self.abilities,
            created_at: self.created_at,
            updated_at: self.created_at,
            expires_at: self.expires_at,
            last_used_at: None,
        }
    }
}

// =============================================================================
// Collaborator traits
// =============================================================================

/// User records consulted for login and registration.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a user by (lowercase) e-mail.
    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    async fn find_by_id(&self, id: u64) -> StorageResult<Option<User>>;

    /// Insert a user. Fails with [`StorageError::AlreadyExists`] if the e-mail is taken.
    async fn create(&self, user: NewUser) -> StorageResult<User>;
}

/// Seeded role rows.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Role>>;

    /// Return the named role, inserting it first if absent.
    async fn ensure(&self, name: &str) -> StorageResult<Role>;
}

/// Token rows.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create(&self, token: NewToken) -> StorageResult<Token>;

    /// Find a row whose id AND digest both match.
    async fn find_by_id_and_hash(
        &self,
        id: u64,
        hashed_secret: &str,
    ) -> StorageResult<Option<Token>>;

    /// Set `last_used_at`. A missing row is not an error.
    async fn touch_last_used(&self, id: u64, at: DateTime<Utc>) -> StorageResult<()>;

    /// Delete every token owned by a user. Returns the number of rows removed.
    async fn delete_by_owner(&self, owner_id: u64) -> StorageResult<u64>;

    /// Delete the owner's tokens of one kind. Returns the number of rows removed.
    async fn delete_by_owner_and_kind(
        &self,
        owner_id: u64,
        kind: TokenKind,
    ) -> StorageResult<u64>;

    /// Delete the owner's tokens of `replacement.kind` and insert `replacement`
    /// in the same write scope.
    ///
    /// Nothing is inserted when no row was deleted; returns `None` in that case.
    async fn replace_by_owner_and_kind(
        &self,
        replacement: NewToken,
    ) -> StorageResult<Option<Token>>;

    /// Delete rows with `expires_at <= now`. Returns the number of rows removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<u64>;
}

/// Constant-time digest comparison.
pub(crate) fn digest_matches(stored: &str, presented: &str) -> bool {
    use subtle::ConstantTimeEq;
    stored.as_bytes().ct_eq(presented.as_bytes()).into()
}
