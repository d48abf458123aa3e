// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory implementation of the storage traits.
//!
//! Backs `AppState::default()` and the test suite. Nothing survives a restart.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    digest_matches, CredentialStore, NewToken, NewUser, Role, RoleStore, StorageError,
    StorageResult, Token, TokenStore, User,
};
use crate::auth::TokenKind;

#[derive(Default)]
struct Tables {
    users: BTreeMap<u64, User>,
    emails: HashMap<String, u64>,
    roles: HashMap<String, Role>,
    tokens: BTreeMap<u64, Token>,
    last_user_id: u64,
    last_role_id: u64,
    last_token_id: u64,
}

impl Tables {
    fn delete_tokens_where(&mut self, predicate: impl Fn(&Token) -> bool) -> u64 {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| !predicate(token));
        (before - self.tokens.len()) as u64
    }

    fn insert_token(&mut self, token: NewToken) -> Token {
        self.last_token_id += 1;
        let token = token.into_token(self.last_token_id);
        self.tokens.insert(token.id, token.clone());
        token
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of token rows currently stored.
    #[cfg(test)]
    pub async fn token_count(&self) -> usize {
        self.tables.read().await.tokens.len()
    }

    /// Snapshot of one token row by id, regardless of its digest.
    #[cfg(test)]
    pub async fn token_by_id(&self, id: u64) -> Option<Token> {
        self.tables.read().await.tokens.get(&id).cloned()
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .emails
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: u64) -> StorageResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> StorageResult<User> {
        let mut tables = self.tables.write().await;
        if tables.emails.contains_key(&user.email) {
            return Err(StorageError::AlreadyExists(format!("User {}", user.email)));
        }

        tables.last_user_id += 1;
        let user = User {
            id: tables.last_user_id,
            uuid: user.uuid,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role_id: user.role_id,
            created_at: user.created_at,
            updated_at: user.created_at,
        };
        tables.emails.insert(user.email.clone(), user.id);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Role>> {
        Ok(self.tables.read().await.roles.get(name).cloned())
    }

    async fn ensure(&self, name: &str) -> StorageResult<Role> {
        let mut tables = self.tables.write().await;
        if let Some(role) = tables.roles.get(name) {
            return Ok(role.clone());
        }

        tables.last_role_id += 1;
        let role = Role {
            id: tables.last_role_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        tables.roles.insert(role.name.clone(), role.clone());
        Ok(role)
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn create(&self, token: NewToken) -> StorageResult<Token> {
        Ok(self.tables.write().await.insert_token(token))
    }

    async fn find_by_id_and_hash(
        &self,
        id: u64,
        hashed_secret: &str,
    ) -> StorageResult<Option<Token>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .get(&id)
            .filter(|token| digest_matches(&token.hashed_secret, hashed_secret))
            .cloned())
    }

    async fn touch_last_used(&self, id: u64, at: DateTime<Utc>) -> StorageResult<()> {
        if let Some(token) = self.tables.write().await.tokens.get_mut(&id) {
            token.last_used_at = Some(at);
            token.updated_at = at;
        }
        Ok(())
    }

    async fn delete_by_owner(&self, owner_id: u64) -> StorageResult<u64> {
        let mut tables = self.tables.write().await;
        Ok(tables.delete_tokens_where(|token| token.owner_id == owner_id))
    }

    async fn delete_by_owner_and_kind(
        &self,
        owner_id: u64,
        kind: TokenKind,
    ) -> StorageResult<u64> {
        let mut tables = self.tables.write().await;
        Ok(tables.delete_tokens_where(|token| token.owner_id == owner_id && token.kind == kind))
    }

    async fn replace_by_owner_and_kind(
        &self,
        replacement: NewToken,
    ) -> StorageResult<Option<Token>> {
        let mut tables = self.tables.write().await;
        let (owner_id, kind) = (replacement.owner_id, replacement.kind);
        let removed =
            tables.delete_tokens_where(|token| token.owner_id == owner_id && token.kind == kind);
        if removed == 0 {
            return Ok(None);
        }
        Ok(Some(tables.insert_token(replacement)))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let mut tables = self.tables.write().await;
        Ok(tables.delete_tokens_where(|token| !token.is_live_at(now)))
    }
}
