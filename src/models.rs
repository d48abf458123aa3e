// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the auth endpoints. All types derive
//! serde and `ToSchema` for JSON handling and OpenAPI documentation.
//!
//! Request types carry a `validate()` that checks shape only (lengths, the
//! presence of `@`). Semantic checks such as the password confirmation and
//! e-mail uniqueness belong to the authenticator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::error::FieldErrors;
use crate::auth::password::MAX_PASSWORD_BYTES;
use crate::auth::Registration;
use crate::storage::User;

const MAX_FIELD_LEN: usize = 250;
const MIN_NAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 8;

/// Collects field messages while validating a request body.
#[derive(Default)]
struct Checker(FieldErrors);

impl Checker {
    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    fn required(&mut self, field: &str, value: &str) -> bool {
        if value.trim().is_empty() {
            self.fail(field, format!("The {field} field is required."));
            false
        } else {
            true
        }
    }

    fn length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.chars().count();
        if len < min {
            self.fail(field, format!("The {field} must be at least {min} characters."));
        } else if len > max {
            self.fail(field, format!("The {field} may not be greater than {max} characters."));
        }
    }

    fn email(&mut self, field: &str, value: &str) {
        let value = value.trim();
        let valid = value
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && !domain.is_empty())
            .unwrap_or(false);
        if !valid {
            self.fail(field, format!("The {field} must be a valid email address."));
        }
    }

    fn finish(self) -> Result<(), FieldErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self.0)
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut check = Checker::default();
        if check.required("email", &self.email) {
            check.email("email", &self.email);
        }
        if self.password.is_empty() {
            check.fail("password", "The password field is required.");
        }
        check.finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut check = Checker::default();
        if check.required("name", &self.name) {
            check.length("name", self.name.trim(), MIN_NAME_LEN, MAX_FIELD_LEN);
        }
        if check.required("email", &self.email) {
            check.email("email", &self.email);
            check.length("email", self.email.trim(), 0, MAX_FIELD_LEN);
        }
        if self.password.is_empty() {
            check.fail("password", "The password field is required.");
        } else if self.password.len() > MAX_PASSWORD_BYTES {
            check.fail(
                "password",
                format!("The password may not be greater than {MAX_PASSWORD_BYTES} bytes."),
            );
        } else {
            check.length("password", &self.password, MIN_PASSWORD_LEN, MAX_FIELD_LEN);
        }
        if self.password_confirmation.is_empty() {
            check.fail(
                "password_confirmation",
                "The password_confirmation field is required.",
            );
        }
        check.finish()
    }
}

impl From<RegisterRequest> for Registration {
    fn from(request: RegisterRequest) -> Self {
        Registration {
            name: request.name,
            email: request.email,
            password: request.password,
            password_confirmation: request.password_confirmation,
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Tokens returned by a successful login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    /// Bearer for ordinary API calls, `"<id>|<secret>"`
    pub access_token: String,
    /// Bearer accepted only by the refresh endpoint
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Always `"Bearer"`
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

/// Public view of a user. The numeric id and the password hash stay internal.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.uuid,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}
