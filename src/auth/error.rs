// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Field name → list of messages, as returned in 422 bodies.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Error kinds produced by the authentication core.
///
/// Token failures keep distinct variants so they can be logged apart, but
/// all of them render the same generic 401 body.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No authorization header present
    #[error("Authorization header is required")]
    MissingAuthHeader,

    /// Header present but not `Bearer <value>`
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,

    /// Bearer value is not `<id>|<secret>`
    #[error("Token is malformed")]
    MalformedToken,

    /// No row matches the (id, digest) pair
    #[error("Invalid Token")]
    InvalidToken,

    #[error("Token Expired")]
    TokenExpired,

    /// Unknown e-mail or wrong password; the two are never told apart
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Live token without an ability the route requires
    #[error("Token lacks the required ability '{missing}'")]
    InsufficientAbilities { missing: String },

    #[error("{message}")]
    Validation { message: String, errors: FieldErrors },

    /// Uniqueness violation on a field
    #[error("{message}")]
    Conflict { field: String, message: String },

    #[error("{0}")]
    NotFound(String),

    /// A storage call outlived its deadline
    #[error("Storage did not respond in time")]
    Timeout,

    /// Infrastructure failure; carries a generic message only
    #[error("{0}")]
    Unexpected(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<FieldErrors>,
}

impl AuthError {
    /// Single-field validation failure.
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.clone()]);
        AuthError::Validation { message, errors }
    }

    /// Whether this is one of the bearer-token failures that share the 401 body.
    pub fn is_token_failure(&self) -> bool {
        matches!(
            self,
            AuthError::MalformedToken | AuthError::InvalidToken | AuthError::TokenExpired
        )
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken | AuthError::InvalidToken | AuthError::TokenExpired => {
                "invalid_token"
            }
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InsufficientAbilities { .. } => "insufficient_abilities",
            AuthError::Validation { .. } => "validation_error",
            AuthError::Conflict { .. } => "conflict",
            AuthError::NotFound(_) => "not_found",
            AuthError::Timeout => "timeout",
            AuthError::Unexpected(_) => "unexpected_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::MalformedToken
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientAbilities { .. } => StatusCode::FORBIDDEN,
            AuthError::Validation { .. } | AuthError::Conflict { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to put in a response body.
    pub fn public_message(&self) -> String {
        if self.is_token_failure() {
            "Invalid or expired token".to_string()
        } else {
            self.to_string()
        }
    }

    /// Field map for 422 responses.
    pub fn field_errors(&self) -> Option<FieldErrors> {
        match self {
            AuthError::Validation { errors, .. } => Some(errors.clone()),
            AuthError::Conflict { field, message } => {
                let mut errors = FieldErrors::new();
                errors.insert(field.clone(), vec![message.clone()]);
                Some(errors)
            }
            _ => None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.public_message(),
            error_code: self.error_code().to_string(),
            errors: self.field_errors(),
        });
        (status, body).into_response()
    }
}
