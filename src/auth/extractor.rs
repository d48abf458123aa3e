// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated users.
//!
//! Use the `Auth` extractor in handlers behind the authentication layer:
//!
//! ```rust,ignore
//! async fn me(Auth(user): Auth) -> impl IntoResponse {
//!     // user.user_id is the owner of a live token
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::middleware::bearer_from_headers;
use super::{AuthError, AuthenticatedUser};
use crate::state::AppState;

/// Extractor for authenticated users.
///
/// Reads the identity attached by the authentication middleware. On a route
/// without that layer, the bearer header is verified here instead.
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // First check if middleware already set the user
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let bearer = bearer_from_headers(&parts.headers)?;
        let (user, verified) = state.authenticator.authenticate_bearer(bearer).await?;
        parts.extensions.insert(verified);

        Ok(Auth(user))
    }
}
