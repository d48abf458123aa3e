// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login, registration, refresh and logout over the storage collaborators.
//!
//! The [`Authenticator`] holds no per-request state. Every storage call runs
//! under a deadline and every storage failure is logged here and re-wrapped
//! as an [`AuthError`] before it leaves the core.

use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::codec;
use super::password::{self, PasswordError};
use super::{Abilities, AuthError, AuthenticatedUser, RoleName, TokenKind, VerifiedBearer};
use crate::storage::{
    CredentialStore, NewToken, NewUser, RoleStore, StorageError, StorageResult, TokenStore, User,
};

/// Token type marker returned alongside every bearer.
pub const TOKEN_TYPE: &str = "Bearer";

/// Default deadline for a single storage call.
pub const DEFAULT_STORAGE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

const UNEXPECTED_DATABASE_ERROR: &str = "unexpected database error";

/// Lifetimes of issued tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(60),
            refresh_ttl: Duration::days(7),
        }
    }
}

impl TokenPolicy {
    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::AccessToken => self.access_ttl,
            TokenKind::RefreshToken => self.refresh_ttl,
        }
    }
}

/// Input to [`Authenticator::register`], already shape-validated by the caller.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

/// A freshly issued token. `bearer` is the only copy of the secret.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token_id: u64,
    pub bearer: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct LoginTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub token_type: &'static str,
}

#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: &'static str,
}

/// Authentication core.
///
/// Collaborators are injected at construction; nothing is looked up globally.
pub struct Authenticator {
    users: Arc<dyn CredentialStore>,
    roles: Arc<dyn RoleStore>,
    tokens: Arc<dyn TokenStore>,
    policy: TokenPolicy,
    password_cost: u32,
    storage_timeout: std::time::Duration,
}

impl Authenticator {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        roles: Arc<dyn RoleStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            users,
            roles,
            tokens,
            policy: TokenPolicy::default(),
            password_cost: password::DEFAULT_COST,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: TokenPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    pub fn with_storage_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Check credentials and issue an access/refresh token pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginTokens, AuthError> {
        let email = normalize_email(email);
        let user = self
            .storage("find user by email", self.users.find_by_email(&email))
            .await?;

        let Some(user) = user else {
            password::verify_dummy(password, self.password_cost).await;
            debug!("login rejected: unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let matches = password::verify(password, &user.password_hash)
            .await
            .map_err(password_failure)?;
        if !matches {
            debug!(user_id = user.id, "login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let access = self
            .issue_token(
                user.id,
                TokenKind::AccessToken,
                TokenKind::AccessToken.abilities(),
                self.policy.access_ttl,
            )
            .await?;
        let refresh = self
            .issue_token(
                user.id,
                TokenKind::RefreshToken,
                TokenKind::RefreshToken.abilities(),
                self.policy.refresh_ttl,
            )
            .await?;

        info!(
            user_id = user.id,
            access_token_id = access.token_id,
            refresh_token_id = refresh.token_id,
            "user logged in"
        );

        Ok(LoginTokens {
            access_token: access.bearer,
            refresh_token: refresh.bearer,
            expires_in: access.expires_in,
            token_type: TOKEN_TYPE,
        })
    }

    /// Create a customer account. Issues no tokens.
    pub async fn register(&self, registration: Registration) -> Result<User, AuthError> {
        if registration.password != registration.password_confirmation {
            return Err(AuthError::validation(
                "password_confirmation",
                "The password confirmation does not match.",
            ));
        }

        let user = self
            .create_user(
                &registration.name,
                &registration.email,
                &registration.password,
                RoleName::default(),
            )
            .await?;
        info!(user_id = user.id, "user registered");
        Ok(user)
    }

    /// Revoke the caller's access token(s) and issue a new one.
    ///
    /// Fails with `NotFound` when the user had no access token to revoke. The
    /// revoke and the insert happen in one storage write.
    pub async fn refresh_token(&self, user_id: u64) -> Result<RefreshedToken, AuthError> {
        let kind = TokenKind::AccessToken;
        let ttl = self.policy.ttl(kind);
        let (new_token, secret) = prepare_token(user_id, kind, kind.abilities(), ttl)?;

        let token = self
            .storage(
                "rotate access token",
                self.tokens.replace_by_owner_and_kind(new_token),
            )
            .await?
            .ok_or_else(|| {
                AuthError::NotFound(format!("no {} token found for the user", kind.as_str()))
            })?;

        info!(user_id, token_id = token.id, "access token refreshed");

        Ok(RefreshedToken {
            access_token: codec::format_bearer(token.id, &secret),
            expires_in: ttl.num_seconds(),
            token_type: TOKEN_TYPE,
        })
    }

    /// Delete every token the user owns. Calling it again is not an error.
    pub async fn logout(&self, user_id: u64) -> Result<u64, AuthError> {
        let removed = self
            .storage("revoke user tokens", self.tokens.delete_by_owner(user_id))
            .await?;
        info!(user_id, removed, "user logged out");
        Ok(removed)
    }

    pub async fn me(&self, user_id: u64) -> Result<User, AuthError> {
        self.storage("find user by id", self.users.find_by_id(user_id))
            .await?
            .ok_or_else(|| AuthError::NotFound("user not found".to_string()))
    }

    /// Generate, hash and persist one token. Returns the bearer value.
    pub async fn issue_token(
        &self,
        owner_id: u64,
        kind: TokenKind,
        abilities: Abilities,
        ttl: Duration,
    ) -> Result<IssuedToken, AuthError> {
        let (new_token, secret) = prepare_token(owner_id, kind, abilities, ttl)?;
        let token = self
            .storage("create token", self.tokens.create(new_token))
            .await?;

        Ok(IssuedToken {
            token_id: token.id,
            bearer: codec::format_bearer(token.id, &secret),
            expires_in: ttl.num_seconds(),
        })
    }

    // =========================================================================
    // Validation (used by the middlewares)
    // =========================================================================

    /// Resolve a bearer value to the identity behind it.
    ///
    /// Records the use on success; a failure to record it is logged and ignored.
    pub async fn authenticate_bearer(
        &self,
        bearer: &str,
    ) -> Result<(AuthenticatedUser, VerifiedBearer), AuthError> {
        let (token_id, secret) = codec::parse_bearer(bearer).map_err(|e| {
            debug!(error = %e, "malformed bearer token");
            AuthError::MalformedToken
        })?;
        let hashed_secret = codec::hash_secret(secret);

        let token = self
            .storage(
                "find token",
                self.tokens.find_by_id_and_hash(token_id, &hashed_secret),
            )
            .await?
            .filter(|token| token.owner_id != 0)
            .ok_or_else(|| {
                debug!(token_id, "no token matches bearer");
                AuthError::InvalidToken
            })?;

        let now = Utc::now();
        if !token.is_live_at(now) {
            debug!(token_id, expires_at = %token.expires_at, "token expired");
            return Err(AuthError::TokenExpired);
        }

        if let Err(e) = self
            .storage("touch token", self.tokens.touch_last_used(token.id, now))
            .await
        {
            warn!(token_id, error = %e, "failed to record token use");
        }

        Ok((
            AuthenticatedUser {
                user_id: token.owner_id,
                token_id: token.id,
                kind: token.kind,
            },
            VerifiedBearer {
                token_id: token.id,
                hashed_secret,
            },
        ))
    }

    /// Abilities persisted on a previously verified token.
    ///
    /// A token that vanished or expired since verification is treated as expired.
    pub async fn token_abilities(&self, bearer: &VerifiedBearer) -> Result<Abilities, AuthError> {
        let token = self
            .storage(
                "load token abilities",
                self.tokens
                    .find_by_id_and_hash(bearer.token_id, &bearer.hashed_secret),
            )
            .await?
            .filter(|token| token.is_live_at(Utc::now()))
            .ok_or(AuthError::TokenExpired)?;
        Ok(token.abilities)
    }

    /// Require every listed ability on a verified token.
    pub async fn authorize(
        &self,
        bearer: &VerifiedBearer,
        required: &[String],
    ) -> Result<(), AuthError> {
        let abilities = self.token_abilities(bearer).await?;
        match abilities.first_missing(required.iter().map(String::as_str)) {
            Some(missing) => {
                debug!(token_id = bearer.token_id, missing, "token lacks ability");
                Err(AuthError::InsufficientAbilities {
                    missing: missing.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Delete token rows that are past their expiry.
    pub async fn prune_expired_tokens(&self) -> Result<u64, AuthError> {
        self.storage("prune expired tokens", self.tokens.delete_expired(Utc::now()))
            .await
    }

    /// Make sure every well-known role exists.
    pub async fn seed_roles(&self) -> Result<(), AuthError> {
        for role in RoleName::ALL {
            let seeded = self.storage("seed role", self.roles.ensure(role.as_str())).await?;
            debug!(role = %role, role_id = seeded.id, "role ready");
        }
        Ok(())
    }

    /// Create a user with the given role unless the e-mail is already taken.
    ///
    /// Returns `None` when the user already existed.
    pub async fn seed_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: RoleName,
    ) -> Result<Option<User>, AuthError> {
        match self.create_user(name, email, password, role).await {
            Ok(user) => {
                info!(user_id = user.id, role = %role, "seeded user");
                Ok(Some(user))
            }
            Err(AuthError::Conflict { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Round-trip to storage for readiness probes.
    pub async fn check_storage(&self) -> Result<(), AuthError> {
        self.storage(
            "readiness probe",
            self.roles.find_by_name(RoleName::Customer.as_str()),
        )
        .await
        .map(|_| ())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: RoleName,
    ) -> Result<User, AuthError> {
        let email = normalize_email(email);
        if self
            .storage("find user by email", self.users.find_by_email(&email))
            .await?
            .is_some()
        {
            return Err(email_taken());
        }

        let role_row = self
            .storage("find role", self.roles.find_by_name(role.as_str()))
            .await?
            .ok_or_else(|| {
                error!(role = %role, "role is not seeded");
                AuthError::Unexpected(UNEXPECTED_DATABASE_ERROR.to_string())
            })?;

        let password_hash = password::hash(password, self.password_cost)
            .await
            .map_err(password_failure)?;

        self.storage(
            "create user",
            self.users.create(NewUser {
                uuid: Uuid::new_v4(),
                name: name.trim().to_string(),
                email,
                password_hash,
                role_id: role_row.id,
                created_at: Utc::now(),
            }),
        )
        .await
    }

    /// Run one storage call under the deadline and translate its failure.
    async fn storage<T, F>(&self, op: &'static str, call: F) -> Result<T, AuthError>
    where
        F: Future<Output = StorageResult<T>>,
    {
        match tokio::time::timeout(self.storage_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(StorageError::AlreadyExists(what))) => {
                debug!(op, %what, "uniqueness violation");
                Err(email_taken())
            }
            Ok(Err(e)) => {
                error!(op, error = %e, "storage failure");
                Err(AuthError::Unexpected(UNEXPECTED_DATABASE_ERROR.to_string()))
            }
            Err(_) => {
                warn!(
                    op,
                    timeout_ms = self.storage_timeout.as_millis() as u64,
                    "storage call timed out"
                );
                Err(AuthError::Timeout)
            }
        }
    }
}

fn prepare_token(
    owner_id: u64,
    kind: TokenKind,
    abilities: Abilities,
    ttl: Duration,
) -> Result<(NewToken, String), AuthError> {
    let secret = codec::generate_secret().map_err(|e| {
        error!(error = %e, "token secret generation failed");
        AuthError::Unexpected("unexpected error".to_string())
    })?;

    let now = Utc::now();
    let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
        error!(ttl_secs = ttl.num_seconds(), "token expiry out of range");
        AuthError::Unexpected("unexpected error".to_string())
    })?;
    let token = NewToken {
        owner_id,
        kind,
        hashed_secret: codec::hash_secret(&secret),
        abilities,
        created_at: now,
        expires_at,
    };
    Ok((token, secret))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn email_taken() -> AuthError {
    AuthError::Conflict {
        field: "email".to_string(),
        message: "The email has already been taken.".to_string(),
    }
}

fn password_failure(e: PasswordError) -> AuthError {
    error!(error = %e, "password hashing failed");
    AuthError::Unexpected("unexpected error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::abilities::{ACCESS_API, REFRESH_TOKEN};
    use crate::auth::password::MIN_COST;
    use crate::storage::{InMemoryStore, Token};
    use async_trait::async_trait;
    use chrono::DateTime;

    async fn fixture() -> (Authenticator, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let auth = Authenticator::new(store.clone(), store.clone(), store.clone())
            .with_password_cost(MIN_COST);
        auth.seed_roles().await.unwrap();
        (auth, store)
    }

    fn registration(email: &str, password: &str) -> Registration {
        Registration {
            name: "Ada Lovelace".to_string(),
            email: email.to_string(),
            password: password.to_string(),
            password_confirmation: password.to_string(),
        }
    }

    async fn seeded() -> (Authenticator, Arc<InMemoryStore>, User) {
        let (auth, store) = fixture().await;
        let user = auth.register(registration("a@b.com", "secret123")).await.unwrap();
        (auth, store, user)
    }

    fn split(bearer: &str) -> (u64, String) {
        let (id, secret) = codec::parse_bearer(bearer).unwrap();
        (id, secret.to_string())
    }

    #[tokio::test]
    async fn login_issues_two_distinct_bearers() {
        let (auth, store, user) = seeded().await;
        let tokens = auth.login("a@b.com", "secret123").await.unwrap();

        assert_ne!(tokens.access_token, tokens.refresh_token);
        assert_eq!(tokens.expires_in, 3600);
        assert_eq!(tokens.token_type, "Bearer");

        let (access_id, _) = split(&tokens.access_token);
        let (refresh_id, _) = split(&tokens.refresh_token);
        let access = store.token_by_id(access_id).await.unwrap();
        let refresh = store.token_by_id(refresh_id).await.unwrap();
        assert_eq!(access.owner_id, user.id);
        assert_eq!(access.kind, TokenKind::AccessToken);
        assert!(access.abilities.contains(ACCESS_API));
        assert_eq!(refresh.kind, TokenKind::RefreshToken);
        assert!(refresh.abilities.contains(REFRESH_TOKEN));
        assert!(refresh.expires_at > access.expires_at);
    }

    #[tokio::test]
    async fn secret_is_never_persisted() {
        let (auth, store, _) = seeded().await;
        let tokens = auth.login("a@b.com", "secret123").await.unwrap();
        let (id, secret) = split(&tokens.access_token);
        let row = store.token_by_id(id).await.unwrap();
        assert_ne!(row.hashed_secret, secret);
        assert_eq!(row.hashed_secret, codec::hash_secret(&secret));
    }

    #[tokio::test]
    async fn login_email_is_case_insensitive() {
        let (auth, _, _) = seeded().await;
        assert!(auth.login("  A@B.com ", "secret123").await.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let (auth, store, _) = seeded().await;
        let wrong = auth.login("a@b.com", "wrong").await.unwrap_err();
        let unknown = auth.login("nobody@b.com", "secret123").await.unwrap_err();

        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.status_code(), unknown.status_code());
        assert_eq!(store.token_count().await, 0);
    }

    #[tokio::test]
    async fn register_rejects_mismatched_confirmation_before_writing() {
        let (auth, _) = fixture().await;
        let mut input = registration("a@b.com", "secret123");
        input.password_confirmation = "secret124".to_string();

        let err = auth.register(input).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation { .. }));
        assert!(matches!(
            auth.login("a@b.com", "secret123").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let (auth, _, _) = seeded().await;
        let err = auth.register(registration("A@b.com", "another-pass")).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict { ref field, .. } if field == "email"));
    }

    #[tokio::test]
    async fn register_stores_hash_uuid_and_customer_role() {
        let (auth, store) = fixture().await;
        let user = auth.register(registration("new@b.com", "secret123")).await.unwrap();
        let customer = store.find_by_name("customer").await.unwrap().unwrap();

        assert_eq!(user.role_id, customer.id);
        assert_ne!(user.password_hash, "secret123");
        assert_ne!(user.uuid, Uuid::nil());
        assert_eq!(user.name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn register_without_seeded_role_is_unexpected() {
        let store = Arc::new(InMemoryStore::new());
        let auth = Authenticator::new(store.clone(), store.clone(), store.clone())
            .with_password_cost(MIN_COST);
        let err = auth.register(registration("a@b.com", "secret123")).await.unwrap_err();
        assert!(matches!(err, AuthError::Unexpected(_)));
    }

    #[tokio::test]
    async fn authenticate_accepts_live_bearer_and_records_use() {
        let (auth, store, user) = seeded().await;
        let tokens = auth.login("a@b.com", "secret123").await.unwrap();

        let (identity, verified) = auth.authenticate_bearer(&tokens.access_token).await.unwrap();
        assert_eq!(identity.user_id, user.id);
        assert_eq!(identity.kind, TokenKind::AccessToken);
        assert_eq!(verified.token_id, identity.token_id);

        let row = store.token_by_id(identity.token_id).await.unwrap();
        assert!(row.last_used_at.is_some());
    }

    #[tokio::test]
    async fn authenticate_rejects_malformed_and_mismatched() {
        let (auth, _, _) = seeded().await;
        let tokens = auth.login("a@b.com", "secret123").await.unwrap();
        let (id, _) = split(&tokens.access_token);

        for bad in ["", "42", "abc|xyz", "42|"] {
            assert!(matches!(
                auth.authenticate_bearer(bad).await,
                Err(AuthError::MalformedToken)
            ));
        }
        let wrong_secret = codec::format_bearer(id, "not-the-secret");
        assert!(matches!(
            auth.authenticate_bearer(&wrong_secret).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn expiry_boundary() {
        let (auth, _, user) = seeded().await;
        let expired = auth
            .issue_token(
                user.id,
                TokenKind::AccessToken,
                TokenKind::AccessToken.abilities(),
                Duration::seconds(-1),
            )
            .await
            .unwrap();
        let live = auth
            .issue_token(
                user.id,
                TokenKind::AccessToken,
                TokenKind::AccessToken.abilities(),
                Duration::hours(1),
            )
            .await
            .unwrap();

        assert!(matches!(
            auth.authenticate_bearer(&expired.bearer).await,
            Err(AuthError::TokenExpired)
        ));
        assert!(auth.authenticate_bearer(&live.bearer).await.is_ok());
    }

    #[tokio::test]
    async fn ability_gate_uses_token_kind() {
        let (auth, _, _) = seeded().await;
        let tokens = auth.login("a@b.com", "secret123").await.unwrap();
        let (_, refresh) = auth.authenticate_bearer(&tokens.refresh_token).await.unwrap();

        let needs_api = vec![ACCESS_API.to_string()];
        let needs_refresh = vec![REFRESH_TOKEN.to_string()];
        assert!(matches!(
            auth.authorize(&refresh, &needs_api).await,
            Err(AuthError::InsufficientAbilities { ref missing }) if missing == ACCESS_API
        ));
        assert!(auth.authorize(&refresh, &needs_refresh).await.is_ok());
        assert!(auth.authorize(&refresh, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn abilities_of_vanished_token_are_unavailable() {
        let (auth, _, user) = seeded().await;
        let tokens = auth.login("a@b.com", "secret123").await.unwrap();
        let (_, verified) = auth.authenticate_bearer(&tokens.access_token).await.unwrap();

        auth.logout(user.id).await.unwrap();
        assert!(matches!(
            auth.token_abilities(&verified).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn logout_then_reuse_fails() {
        let (auth, _, user) = seeded().await;
        let tokens = auth.login("a@b.com", "secret123").await.unwrap();

        assert_eq!(auth.logout(user.id).await.unwrap(), 2);
        assert!(matches!(
            auth.authenticate_bearer(&tokens.access_token).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            auth.authenticate_bearer(&tokens.refresh_token).await,
            Err(AuthError::InvalidToken)
        ));
        assert_eq!(auth.logout(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn refresh_rotates_only_the_access_token() {
        let (auth, store, user) = seeded().await;
        let tokens = auth.login("a@b.com", "secret123").await.unwrap();
        let (old_id, _) = split(&tokens.access_token);
        let old_abilities = store.token_by_id(old_id).await.unwrap().abilities;

        let refreshed = auth.refresh_token(user.id).await.unwrap();
        assert_eq!(refreshed.expires_in, 3600);
        assert_eq!(refreshed.token_type, "Bearer");

        assert!(matches!(
            auth.authenticate_bearer(&tokens.access_token).await,
            Err(AuthError::InvalidToken)
        ));
        let (identity, _) = auth.authenticate_bearer(&refreshed.access_token).await.unwrap();
        assert_eq!(identity.user_id, user.id);
        let new_abilities = store.token_by_id(identity.token_id).await.unwrap().abilities;
        assert_eq!(new_abilities, old_abilities);

        assert!(auth.authenticate_bearer(&tokens.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_without_access_token_is_not_found() {
        let (auth, store, user) = seeded().await;
        let err = auth.refresh_token(user.id).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
        assert_eq!(store.token_count().await, 0);
    }

    #[tokio::test]
    async fn me_returns_user_or_not_found() {
        let (auth, _, user) = seeded().await;
        assert_eq!(auth.me(user.id).await.unwrap().email, "a@b.com");
        assert!(matches!(auth.me(user.id + 1).await, Err(AuthError::NotFound(_))));
    }

    #[tokio::test]
    async fn prune_removes_expired_rows() {
        let (auth, store, user) = seeded().await;
        auth.login("a@b.com", "secret123").await.unwrap();
        auth.issue_token(
            user.id,
            TokenKind::AccessToken,
            Abilities::new(),
            Duration::seconds(-5),
        )
        .await
        .unwrap();

        assert_eq!(auth.prune_expired_tokens().await.unwrap(), 1);
        assert_eq!(store.token_count().await, 2);
    }

    #[tokio::test]
    async fn seed_user_is_idempotent() {
        let (auth, store) = fixture().await;
        let admin = auth
            .seed_user("Admin", "admin@shop.test", "admin-pass", RoleName::Admin)
            .await
            .unwrap()
            .unwrap();
        let admin_role = store.find_by_name("admin").await.unwrap().unwrap();
        assert_eq!(admin.role_id, admin_role.id);

        let again = auth
            .seed_user("Admin", "admin@shop.test", "admin-pass", RoleName::Admin)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    struct StalledUsers;

    #[async_trait]
    impl CredentialStore for StalledUsers {
        async fn find_by_email(&self, _email: &str) -> StorageResult<Option<User>> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(None)
        }

        async fn find_by_id(&self, _id: u64) -> StorageResult<Option<User>> {
            Ok(None)
        }

        async fn create(&self, _user: NewUser) -> StorageResult<User> {
            Err(StorageError::Corrupt("read only".to_string()))
        }
    }

    #[tokio::test]
    async fn stalled_storage_times_out() {
        let store = Arc::new(InMemoryStore::new());
        let auth = Authenticator::new(Arc::new(StalledUsers), store.clone(), store)
            .with_storage_timeout(std::time::Duration::from_millis(50));

        let err = auth.login("a@b.com", "secret123").await.unwrap_err();
        assert!(matches!(err, AuthError::Timeout));
    }

    struct BrokenUsers;

    #[async_trait]
    impl CredentialStore for BrokenUsers {
        async fn find_by_email(&self, _email: &str) -> StorageResult<Option<User>> {
            Err(StorageError::Corrupt("users table: bad row at key 7".to_string()))
        }

        async fn find_by_id(&self, _id: u64) -> StorageResult<Option<User>> {
            Err(StorageError::Corrupt("users table: bad row at key 7".to_string()))
        }

        async fn create(&self, _user: NewUser) -> StorageResult<User> {
            Err(StorageError::Corrupt("users table: bad row at key 7".to_string()))
        }
    }

    #[tokio::test]
    async fn storage_failure_does_not_leak_detail() {
        let store = Arc::new(InMemoryStore::new());
        let auth = Authenticator::new(Arc::new(BrokenUsers), store.clone(), store);

        let err = auth.login("a@b.com", "secret123").await.unwrap_err();
        assert!(matches!(err, AuthError::Unexpected(_)));
        assert_eq!(err.public_message(), "unexpected database error");
        assert!(matches!(auth.me(1).await, Err(AuthError::Unexpected(_))));
    }

    #[tokio::test]
    async fn out_of_range_expiry_is_an_error() {
        let (auth, _, user) = seeded().await;
        let auth = auth.with_policy(TokenPolicy {
            access_ttl: Duration::minutes(60),
            refresh_ttl: Duration::days(100_000_000),
        });

        assert!(matches!(
            auth.login("a@b.com", "secret123").await,
            Err(AuthError::Unexpected(_))
        ));
        assert!(matches!(
            auth.issue_token(
                user.id,
                TokenKind::AccessToken,
                Abilities::new(),
                Duration::days(100_000_000),
            )
            .await,
            Err(AuthError::Unexpected(_))
        ));
    }

    /// Token store whose `touch_last_used` always fails.
    struct UntouchableTokens(Arc<InMemoryStore>);

    #[async_trait]
    impl TokenStore for UntouchableTokens {
        async fn create(&self, token: NewToken) -> StorageResult<Token> {
            TokenStore::create(self.0.as_ref(), token).await
        }

        async fn find_by_id_and_hash(
            &self,
            id: u64,
            hashed_secret: &str,
        ) -> StorageResult<Option<Token>> {
            self.0.find_by_id_and_hash(id, hashed_secret).await
        }

        async fn touch_last_used(&self, _id: u64, _at: DateTime<Utc>) -> StorageResult<()> {
            Err(StorageError::Corrupt("tokens table is read only".to_string()))
        }

        async fn delete_by_owner(&self, owner_id: u64) -> StorageResult<u64> {
            self.0.delete_by_owner(owner_id).await
        }

        async fn delete_by_owner_and_kind(
            &self,
            owner_id: u64,
            kind: TokenKind,
        ) -> StorageResult<u64> {
            self.0.delete_by_owner_and_kind(owner_id, kind).await
        }

        async fn replace_by_owner_and_kind(
            &self,
            replacement: NewToken,
        ) -> StorageResult<Option<Token>> {
            self.0.replace_by_owner_and_kind(replacement).await
        }

        async fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
            self.0.delete_expired(now).await
        }
    }

    #[tokio::test]
    async fn failed_touch_does_not_fail_authentication() {
        let store = Arc::new(InMemoryStore::new());
        let auth = Authenticator::new(
            store.clone(),
            store.clone(),
            Arc::new(UntouchableTokens(store.clone())),
        )
        .with_password_cost(MIN_COST);
        auth.seed_roles().await.unwrap();
        let user = auth.register(registration("a@b.com", "secret123")).await.unwrap();
        let tokens = auth.login("a@b.com", "secret123").await.unwrap();

        let (identity, _) = auth.authenticate_bearer(&tokens.access_token).await.unwrap();
        assert_eq!(identity.user_id, user.id);
        let row = store.token_by_id(identity.token_id).await.unwrap();
        assert!(row.last_used_at.is_none());
    }
}
