// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and ability middleware for Axum.
//!
//! Two layers, applied with `route_layer` so unmatched paths still 404:
//!
//! 1. [`authenticate`] resolves the bearer to a live token and attaches
//!    [`AuthenticatedUser`](crate::auth::AuthenticatedUser) and
//!    [`VerifiedBearer`] to the request extensions.
//! 2. [`require_abilities`] checks the token's persisted abilities against
//!    the set an [`AbilityGate`] was built with.
//!
//! ```rust,ignore
//! let gate = AbilityGate::new(state.authenticator.clone(), [ACCESS_API]);
//!
//! Router::new()
//!     .route("/me", get(me))
//!     .route_layer(from_fn_with_state(gate, require_abilities))
//!     .route_layer(from_fn_with_state(state.clone(), authenticate));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{AuthError, Authenticator, VerifiedBearer};
use crate::state::AppState;

/// Pull the bearer value out of an `Authorization: Bearer <value>` header.
pub fn bearer_from_headers(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let bearer = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?;

    Ok(bearer.trim())
}

/// Reject the request unless it carries a live bearer token.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let bearer = match bearer_from_headers(request.headers()) {
        Ok(bearer) => bearer.to_owned(),
        Err(e) => return e.into_response(),
    };

    match state.authenticator.authenticate_bearer(&bearer).await {
        Ok((user, verified)) => {
            request.extensions_mut().insert(user);
            request.extensions_mut().insert(verified);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Abilities a route requires, plus the authenticator to look them up with.
#[derive(Clone)]
pub struct AbilityGate {
    authenticator: Arc<Authenticator>,
    required: Arc<[String]>,
}

impl AbilityGate {
    pub fn new<I, S>(authenticator: Arc<Authenticator>, required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            authenticator,
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }
}

/// Reject the request unless its token carries every ability the gate requires.
///
/// Reuses the bearer verified by [`authenticate`]; if that layer did not run,
/// the header is verified here instead.
pub async fn require_abilities(
    State(gate): State<AbilityGate>,
    request: Request,
    next: Next,
) -> Response {
    let verified = match request.extensions().get::<VerifiedBearer>().cloned() {
        Some(verified) => verified,
        None => {
            let bearer = match bearer_from_headers(request.headers()) {
                Ok(bearer) => bearer.to_owned(),
                Err(e) => return e.into_response(),
            };
            match gate.authenticator.authenticate_bearer(&bearer).await {
                Ok((_, verified)) => verified,
                Err(e) => return e.into_response(),
            }
        }
    };

    match gate.authenticator.authorize(&verified, gate.required()).await {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::abilities::{ACCESS_API, REFRESH_TOKEN};
    use crate::auth::{Auth, AuthenticatedUser, Registration};
    use axum::{
        body::{to_bytes, Body},
        http::StatusCode,
        middleware::from_fn_with_state,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    async fn whoami(Auth(user): Auth) -> String {
        user.user_id.to_string()
    }

    async fn peek(request: Request) -> String {
        request
            .extensions()
            .get::<AuthenticatedUser>()
            .map(|user| user.token_id.to_string())
            .unwrap_or_default()
    }

    fn app(state: AppState, required: &'static str) -> Router {
        let gate = AbilityGate::new(state.authenticator.clone(), [required]);
        Router::new()
            .route("/whoami", get(whoami))
            .route("/peek", get(peek))
            .route_layer(from_fn_with_state(gate, require_abilities))
            .route_layer(from_fn_with_state(state.clone(), authenticate))
            .with_state(state)
    }

    async fn login(state: &AppState) -> (u64, String, String) {
        let user = state
            .authenticator
            .register(Registration {
                name: "Ada".to_string(),
                email: "a@b.com".to_string(),
                password: "secret123".to_string(),
                password_confirmation: "secret123".to_string(),
            })
            .await
            .unwrap();
        let tokens = state.authenticator.login("a@b.com", "secret123").await.unwrap();
        (user.id, tokens.access_token, tokens.refresh_token)
    }

    async fn call(app: Router, path: &str, authorization: Option<String>) -> (StatusCode, String) {
        let mut builder = axum::http::Request::builder().uri(path);
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn bearer_from_headers_requires_prefix() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_from_headers(&headers), Err(AuthError::MissingAuthHeader)));

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(matches!(bearer_from_headers(&headers), Err(AuthError::InvalidAuthHeader)));

        headers.insert(AUTHORIZATION, "Bearer 7|secret ".parse().unwrap());
        assert_eq!(bearer_from_headers(&headers).unwrap(), "7|secret");
    }

    #[tokio::test]
    async fn missing_header_is_401() {
        let state = AppState::for_tests().await;
        let (status, body) = call(app(state, ACCESS_API), "/whoami", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("missing_auth_header"));
    }

    #[tokio::test]
    async fn malformed_and_unknown_bearers_are_401() {
        let state = AppState::for_tests().await;
        login(&state).await;

        for value in ["Bearer not-a-token", "Bearer 999|deadbeef", "Bearer 1|"] {
            let (status, body) =
                call(app(state.clone(), ACCESS_API), "/whoami", Some(value.to_string())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{value}");
            assert!(body.contains("invalid_token"));
        }
    }

    #[tokio::test]
    async fn access_token_reaches_handler() {
        let state = AppState::for_tests().await;
        let (user_id, access, _) = login(&state).await;

        let (status, body) =
            call(app(state, ACCESS_API), "/whoami", Some(format!("Bearer {access}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, user_id.to_string());
    }

    #[tokio::test]
    async fn identity_is_visible_in_extensions() {
        let state = AppState::for_tests().await;
        let (_, access, _) = login(&state).await;
        let (token_id, _) = crate::auth::codec::parse_bearer(&access).unwrap();

        let (status, body) =
            call(app(state, ACCESS_API), "/peek", Some(format!("Bearer {access}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, token_id.to_string());
    }

    #[tokio::test]
    async fn refresh_token_is_forbidden_on_api_routes() {
        let state = AppState::for_tests().await;
        let (_, _, refresh) = login(&state).await;

        let (status, body) =
            call(app(state, ACCESS_API), "/whoami", Some(format!("Bearer {refresh}"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains("insufficient_abilities"));
    }

    #[tokio::test]
    async fn refresh_token_passes_refresh_gate() {
        let state = AppState::for_tests().await;
        let (user_id, access, refresh) = login(&state).await;

        let (status, body) = call(
            app(state.clone(), REFRESH_TOKEN),
            "/whoami",
            Some(format!("Bearer {refresh}")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, user_id.to_string());

        let (status, _) =
            call(app(state, REFRESH_TOKEN), "/whoami", Some(format!("Bearer {access}"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn gate_alone_verifies_the_header() {
        let state = AppState::for_tests().await;
        let (user_id, access, _) = login(&state).await;
        let gate = AbilityGate::new(state.authenticator.clone(), [ACCESS_API]);
        let gated_only = Router::new()
            .route("/whoami", get(whoami))
            .route_layer(from_fn_with_state(gate, require_abilities))
            .with_state(state);

        let (status, body) =
            call(gated_only.clone(), "/whoami", Some(format!("Bearer {access}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, user_id.to_string());

        let (status, _) = call(gated_only, "/whoami", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
