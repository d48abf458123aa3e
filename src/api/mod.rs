// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{
        abilities::{ACCESS_API, REFRESH_TOKEN},
        middleware::{authenticate, require_abilities, AbilityGate},
    },
    error::ApiError,
    models::{
        LoginRequest, MessageResponse, RefreshTokenResponse, RegisterRequest, TokenResponse,
        UserResponse,
    },
    state::AppState,
};

pub mod auth;
pub mod health;

/// Routes under `/v1/auth`.
///
/// Login and register are open. Everything else sits behind the
/// authentication layer; refresh and me additionally require an ability.
fn auth_routes(state: &AppState) -> Router<AppState> {
    let authenticator = state.authenticator.clone();

    let refresh = Router::new()
        .route("/refresh-token", post(auth::refresh_token))
        .route_layer(from_fn_with_state(
            AbilityGate::new(authenticator.clone(), [REFRESH_TOKEN]),
            require_abilities,
        ));

    let api = Router::new()
        .route("/me", get(auth::me))
        .route_layer(from_fn_with_state(
            AbilityGate::new(authenticator, [ACCESS_API]),
            require_abilities,
        ));

    let authenticated = Router::new()
        .route("/logout", post(auth::logout))
        .merge(refresh)
        .merge(api)
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .merge(authenticated)
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .nest("/auth", auth_routes(&state))
        .with_state(state.clone());

    Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state)
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .fallback(route_not_found)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login,
        auth::register,
        auth::refresh_token,
        auth::logout,
        auth::me,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            LoginRequest,
            RegisterRequest,
            TokenResponse,
            RefreshTokenResponse,
            UserResponse,
            MessageResponse,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks
        )
    ),
    tags(
        (name = "Auth", description = "Login, registration and token lifecycle"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
