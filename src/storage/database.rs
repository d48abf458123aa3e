// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded credential and token database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user id → serialized [`User`]
//! - `user_emails`: lowercase e-mail → user id
//! - `roles`: role name → serialized [`Role`]
//! - `tokens`: token id → serialized token row (digest only, never the secret)
//! - `owner_tokens`: (owner id, token id) → token name, for per-user revocation
//! - `sequences`: sequence name → last assigned id
//!
//! redb is synchronous; every call hops onto the blocking pool.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};

use super::{
    digest_matches, CredentialStore, NewToken, NewUser, Role, RoleStore, StorageError,
    StorageResult, Token, TokenStore, User,
};
use crate::auth::codec::{decode_abilities, encode_abilities};
use crate::auth::TokenKind;

// =============================================================================
// Table Definitions
// =============================================================================

const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");

const USER_EMAILS: TableDefinition<&str, u64> = TableDefinition::new("user_emails");

const ROLES: TableDefinition<&str, &[u8]> = TableDefinition::new("roles");

const TOKENS: TableDefinition<u64, &[u8]> = TableDefinition::new("tokens");

/// Key: `(owner_id, token_id)` so one owner's tokens form a contiguous range.
const OWNER_TOKENS: TableDefinition<(u64, u64), &str> = TableDefinition::new("owner_tokens");

const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

const USER_SEQUENCE: &str = "users";
const ROLE_SEQUENCE: &str = "roles";
const TOKEN_SEQUENCE: &str = "tokens";

// =============================================================================
// Token Row
// =============================================================================

/// On-disk shape of a token. Abilities are kept in their serialized list form.
#[derive(Debug, Serialize, Deserialize)]
struct TokenRow {
    id: u64,
    owner_id: u64,
    name: String,
    token: String,
    abilities: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    last_used_at: Option<DateTime<Utc>>,
}

impl TokenRow {
    fn from_token(token: &Token) -> StorageResult<Self> {
        let abilities = encode_abilities(&token.abilities)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(Self {
            id: token.id,
            owner_id: token.owner_id,
            name: token.kind.as_str().to_string(),
            token: token.hashed_secret.clone(),
            abilities,
            created_at: token.created_at,
            updated_at: token.updated_at,
            expires_at: token.expires_at,
            last_used_at: token.last_used_at,
        })
    }

    fn into_token(self) -> StorageResult<Token> {
        let kind = TokenKind::from_name(&self.name).ok_or_else(|| {
            StorageError::Corrupt(format!("token {} has name {}", self.id, self.name))
        })?;
        let abilities = decode_abilities(&self.abilities)
            .map_err(|e| StorageError::Corrupt(format!("token {} abilities: {e}", self.id)))?;
        Ok(Token {
            id: self.id,
            owner_id: self.owner_id,
            kind,
            hashed_secret: self.token,
            abilities,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
            last_used_at: self.last_used_at,
        })
    }
}

// =============================================================================
// Write Helpers
// =============================================================================

fn next_id(txn: &WriteTransaction, sequence: &str) -> StorageResult<u64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let next = table.get(sequence)?.map(|v| v.value()).unwrap_or(0) + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

fn insert_token(txn: &WriteTransaction, new: NewToken) -> StorageResult<Token> {
    let token = new.into_token(next_id(txn, TOKEN_SEQUENCE)?);
    let row = serde_json::to_vec(&TokenRow::from_token(&token)?)?;

    let mut tokens = txn.open_table(TOKENS)?;
    tokens.insert(token.id, row.as_slice())?;

    let mut index = txn.open_table(OWNER_TOKENS)?;
    index.insert((token.owner_id, token.id), token.kind.as_str())?;

    Ok(token)
}

/// Remove an owner's tokens, optionally only those of one kind.
fn delete_owner_tokens(
    txn: &WriteTransaction,
    owner_id: u64,
    kind: Option<TokenKind>,
) -> StorageResult<u64> {
    let mut index = txn.open_table(OWNER_TOKENS)?;
    let mut tokens = txn.open_table(TOKENS)?;

    let doomed = {
        let mut ids = Vec::new();
        for entry in index.range((owner_id, 0u64)..=(owner_id, u64::MAX))? {
            let (key, name) = entry?;
            let (_, token_id) = key.value();
            if kind.map_or(true, |kind| kind.as_str() == name.value()) {
                ids.push(token_id);
            }
        }
        ids
    };

    for token_id in &doomed {
        index.remove((owner_id, *token_id))?;
        tokens.remove(*token_id)?;
    }

    Ok(doomed.len() as u64)
}

// =============================================================================
// AuthDatabase
// =============================================================================

/// Raises its flag when dropped before [`AbandonGuard::disarm`].
struct AbandonGuard(Option<Arc<AtomicBool>>);

impl AbandonGuard {
    fn new() -> (Self, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (Self(Some(Arc::clone(&flag))), flag)
    }

    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if let Some(flag) = self.0.take() {
            flag.store(true, Ordering::Release);
        }
    }
}

/// Embedded ACID database holding users, roles and tokens.
#[derive(Clone)]
pub struct AuthDatabase {
    db: Arc<Database>,
}

impl AuthDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Corrupt(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_EMAILS)?;
            let _ = write_txn.open_table(ROLES)?;
            let _ = write_txn.open_table(TOKENS)?;
            let _ = write_txn.open_table(OWNER_TOKENS)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    async fn run<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: FnOnce(&Database) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db)).await?
    }

    /// Run `op` in one write transaction on the blocking pool.
    ///
    /// The blocking task outlives a caller that stops waiting (a timeout drops
    /// the future). In that case the transaction is aborted instead of
    /// committed, unless the commit had already started.
    async fn write<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: FnOnce(&WriteTransaction) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let (guard, abandoned) = AbandonGuard::new();
        let result = self
            .run(move |db| {
                let write_txn = db.begin_write()?;
                let value = op(&write_txn)?;
                if abandoned.load(Ordering::Acquire) {
                    write_txn.abort()?;
                    return Err(StorageError::Abandoned);
                }
                write_txn.commit()?;
                Ok(value)
            })
            .await;
        guard.disarm();
        result
    }

    fn read_user(db: &Database, id: u64) -> StorageResult<Option<User>> {
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn read_token(db: &Database, id: u64) -> StorageResult<Option<Token>> {
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(TOKENS)?;
        match table.get(id)? {
            Some(value) => {
                let row: TokenRow = serde_json::from_slice(value.value())?;
                Ok(Some(row.into_token()?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CredentialStore for AuthDatabase {
    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let email = email.to_owned();
        self.run(move |db| {
            let id = {
                let read_txn = db.begin_read()?;
                let table = read_txn.open_table(USER_EMAILS)?;
                let id = table.get(email.as_str())?.map(|v| v.value());
                id
            };
            match id {
                Some(id) => Self::read_user(db, id),
                None => Ok(None),
            }
        })
        .await
    }

    async fn find_by_id(&self, id: u64) -> StorageResult<Option<User>> {
        self.run(move |db| Self::read_user(db, id)).await
    }

    async fn create(&self, user: NewUser) -> StorageResult<User> {
        self.write(move |write_txn| {
            let mut emails = write_txn.open_table(USER_EMAILS)?;
            if emails.get(user.email.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists(format!("User {}", user.email)));
            }

            let id = next_id(write_txn, USER_SEQUENCE)?;
            let created = User {
                id,
                uuid: user.uuid,
                name: user.name,
                email: user.email,
                password_hash: user.password_hash,
                role_id: user.role_id,
                created_at: user.created_at,
                updated_at: user.created_at,
            };

            let json = serde_json::to_vec(&created)?;
            let mut users = write_txn.open_table(USERS)?;
            users.insert(id, json.as_slice())?;
            emails.insert(created.email.as_str(), id)?;
            Ok(created)
        })
        .await
    }
}

#[async_trait]
impl RoleStore for AuthDatabase {
    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Role>> {
        let name = name.to_owned();
        self.run(move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(ROLES)?;
            match table.get(name.as_str())? {
                Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn ensure(&self, name: &str) -> StorageResult<Role> {
        let name = name.to_owned();
        self.write(move |write_txn| {
            let mut roles = write_txn.open_table(ROLES)?;
            let existing = roles
                .get(name.as_str())?
                .map(|value| serde_json::from_slice::<Role>(value.value()))
                .transpose()?;
            if let Some(role) = existing {
                return Ok(role);
            }

            let role = Role {
                id: next_id(write_txn, ROLE_SEQUENCE)?,
                name: name.clone(),
                created_at: Utc::now(),
            };
            let json = serde_json::to_vec(&role)?;
            roles.insert(name.as_str(), json.as_slice())?;
            Ok(role)
        })
        .await
    }
}

#[async_trait]
impl TokenStore for AuthDatabase {
    async fn create(&self, token: NewToken) -> StorageResult<Token> {
        self.write(move |write_txn| insert_token(write_txn, token)).await
    }

    async fn find_by_id_and_hash(
        &self,
        id: u64,
        hashed_secret: &str,
    ) -> StorageResult<Option<Token>> {
        let hashed_secret = hashed_secret.to_owned();
        self.run(move |db| {
            Ok(Self::read_token(db, id)?
                .filter(|token| digest_matches(&token.hashed_secret, &hashed_secret)))
        })
        .await
    }

    async fn touch_last_used(&self, id: u64, at: DateTime<Utc>) -> StorageResult<()> {
        self.write(move |write_txn| {
            let mut table = write_txn.open_table(TOKENS)?;
            let existing = table.get(id)?.map(|value| value.value().to_vec());
            if let Some(bytes) = existing {
                let mut row: TokenRow = serde_json::from_slice(&bytes)?;
                row.last_used_at = Some(at);
                row.updated_at = at;
                let json = serde_json::to_vec(&row)?;
                table.insert(id, json.as_slice())?;
            }
            Ok(())
        })
        .await
    }

    async fn delete_by_owner(&self, owner_id: u64) -> StorageResult<u64> {
        self.write(move |write_txn| delete_owner_tokens(write_txn, owner_id, None)).await
    }

    async fn delete_by_owner_and_kind(
        &self,
        owner_id: u64,
        kind: TokenKind,
    ) -> StorageResult<u64> {
        self.write(move |write_txn| delete_owner_tokens(write_txn, owner_id, Some(kind))).await
    }

    async fn replace_by_owner_and_kind(
        &self,
        replacement: NewToken,
    ) -> StorageResult<Option<Token>> {
        self.write(move |write_txn| {
            let removed =
                delete_owner_tokens(write_txn, replacement.owner_id, Some(replacement.kind))?;
            if removed == 0 {
                return Ok(None);
            }
            insert_token(write_txn, replacement).map(Some)
        })
        .await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        self.write(move |write_txn| {
            let mut tokens = write_txn.open_table(TOKENS)?;
            let mut index = write_txn.open_table(OWNER_TOKENS)?;

            let mut expired = Vec::new();
            for entry in tokens.iter()? {
                let (_, value) = entry?;
                let row: TokenRow = serde_json::from_slice(value.value())?;
                if row.expires_at <= now {
                    expired.push((row.owner_id, row.id));
                }
            }

            for (owner_id, token_id) in &expired {
                tokens.remove(*token_id)?;
                index.remove((*owner_id, *token_id))?;
            }
            Ok(expired.len() as u64)
        })
        .await
    }
}
