// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Auth endpoints: login, register, refresh, logout, me.
//!
//! Handlers only decode and shape-check bodies; every decision is made by
//! the [`Authenticator`](crate::auth::Authenticator).

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};

use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::{
    LoginRequest, MessageResponse, RefreshTokenResponse, RegisterRequest, TokenResponse,
    UserResponse,
};
use crate::state::AppState;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

/// Exchange e-mail and password for an access/refresh token pair.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 401, description = "Invalid email or password"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let request = body(payload)?;
    request.validate().map_err(ApiError::validation)?;

    let tokens = state
        .authenticator
        .login(&request.email, &request.password)
        .await?;

    Ok(Json(TokenResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: tokens.expires_in,
        token_type: tokens.token_type.to_string(),
    }))
}

/// Create a customer account.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 422, description = "Validation failed or email already taken")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let request = body(payload)?;
    request.validate().map_err(ApiError::validation)?;

    let user = state.authenticator.register(request.into()).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Rotate the caller's access token. Requires a refresh token.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh-token",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "New access token", body = RefreshTokenResponse),
        (status = 401, description = "Invalid or expired token"),
        (status = 403, description = "Token lacks the refresh-token ability"),
        (status = 404, description = "No access token to rotate")
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<Json<RefreshTokenResponse>, ApiError> {
    let refreshed = state.authenticator.refresh_token(user.user_id).await?;
    Ok(Json(RefreshTokenResponse {
        access_token: refreshed.access_token,
        expires_in: refreshed.expires_in,
        token_type: refreshed.token_type.to_string(),
    }))
}

/// Revoke every token of the caller.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Invalid or expired token")
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<Json<MessageResponse>, ApiError> {
    state.authenticator.logout(user.user_id).await?;
    Ok(Json(MessageResponse {
        message: "Successfully logged out".to_string(),
    }))
}

/// Current user behind the access token.
#[utoipa::path(
    get,
    path = "/v1/auth/me",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = UserResponse),
        (status = 401, description = "Invalid or expired token"),
        (status = 403, description = "Token lacks the access-api ability")
    )
)]
pub async fn me(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.authenticator.me(user.user_id).await?;
    Ok(Json(user.into()))
}
