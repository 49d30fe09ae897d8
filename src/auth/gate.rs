//! Per-request authentication.
//!
//! Runs in front of every route. Public routes pass through anonymously; every
//! other request either gets a [`Principal`] attached to its extensions or is
//! rejected with 401 before reaching a handler. No authorization happens here.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::{error::AuthError, principal::Principal, principal::PrincipalResolver};
use crate::{error::ApiError, state::AppState};

fn is_public(method: &Method, path: &str) -> bool {
    (method == Method::POST && path == "/auth/login") || (method == Method::GET && path == "/health")
}

pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if is_public(req.method(), req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let token = bearer_token(req.headers().get(AUTHORIZATION))?.to_owned();
    let principal = establish_identity(&state, &token).await?;
    debug!(user_id = %principal.id(), "request authenticated");

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Verifies the token against the injected clock and loads its subject.
pub async fn establish_identity(state: &AppState, token: &str) -> Result<Principal, ApiError> {
    let claims = state
        .keys
        .verify(token, state.clock.now())
        .map_err(AuthError::from)?;
    PrincipalResolver::new(&*state.store, &*state.hasher)
        .resolve_from_token(&claims)
        .await
}

/// Extracts `<token>` from `Bearer <token>`; the scheme is case-insensitive.
pub fn bearer_token(header: Option<&HeaderValue>) -> Result<&str, AuthError> {
    let value = header
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::MissingCredentials)?;
    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthError::MissingCredentials)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingCredentials);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::StatusCode,
        routing::{get, post},
        Router,
    };
    use time::Duration;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::extractors::AuthUser;
    use crate::store::{NewUser, Role, UserId};

    async fn whoami(AuthUser(principal): AuthUser) -> String {
        principal.username().to_string()
    }

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route("/auth/login", post(|| async { "login" }))
            .layer(axum::middleware::from_fn_with_state(state.clone(), authenticate))
            .with_state(state)
    }

    async fn seed_user(state: &AppState, username: &str) -> UserId {
        state
            .store
            .create_user(NewUser {
                username: username.into(),
                password_digest: "unused".into(),
                role: Role::User,
            })
            .await
            .unwrap()
            .id
    }

    fn token_for(state: &AppState, username: &str, id: UserId) -> String {
        state
            .keys
            .issue(username, id, state.clock.now(), state.keys.ttl)
            .unwrap()
    }

    async fn call(app: Router, auth: Option<&str>, uri: &str) -> (StatusCode, serde_json::Value) {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()));
        (status, json)
    }

    #[test]
    fn bearer_token_parsing() {
        let ok = HeaderValue::from_static("Bearer abc.def.ghi");
        assert_eq!(bearer_token(Some(&ok)), Ok("abc.def.ghi"));
        let lower = HeaderValue::from_static("bearer abc");
        assert_eq!(bearer_token(Some(&lower)), Ok("abc"));

        for bad in ["Basic dXNlcjpwYXNz", "Bearer", "Bearer    ", "abc.def.ghi"] {
            let value = HeaderValue::from_static(bad);
            assert_eq!(
                bearer_token(Some(&value)),
                Err(AuthError::MissingCredentials),
                "{bad:?}"
            );
        }
        assert_eq!(bearer_token(None), Err(AuthError::MissingCredentials));
    }

    #[tokio::test]
    async fn valid_token_attaches_principal() {
        let (state, _) = crate::state::testing::fake();
        let id = seed_user(&state, "erin").await;
        let token = token_for(&state, "erin", id);

        let (status, body) = call(router(state), Some(&format!("Bearer {token}")), "/whoami").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "erin");
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let (state, _) = crate::state::testing::fake();
        let (status, body) = call(router(state), None, "/whoami").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 401);
        assert_eq!(
            body["message"],
            "Authorization header with a Bearer token is required"
        );
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let (state, clock) = crate::state::testing::fake();
        let id = seed_user(&state, "erin").await;
        let token = token_for(&state, "erin", id);
        clock.advance(Duration::minutes(60));

        let (status, body) = call(router(state), Some(&format!("Bearer {token}")), "/whoami").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Token has expired");
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let (state, _) = crate::state::testing::fake();
        let id = seed_user(&state, "erin").await;
        let mut token = token_for(&state, "erin", id);
        let last = token.pop().unwrap();
        token.push(if last == 'A' { 'B' } else { 'A' });

        let (status, body) = call(router(state), Some(&format!("Bearer {token}")), "/whoami").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Token signature is invalid");
    }

    #[tokio::test]
    async fn garbage_token_is_malformed() {
        let (state, _) = crate::state::testing::fake();
        let (status, body) = call(router(state), Some("Bearer nonsense"), "/whoami").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Token is malformed");
    }

    #[tokio::test]
    async fn token_for_unknown_subject_is_rejected() {
        let (state, _) = crate::state::testing::fake();
        let token = token_for(&state, "ghost", UserId(1));
        let (status, body) = call(router(state), Some(&format!("Bearer {token}")), "/whoami").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Token does not identify an active account");
    }

    #[tokio::test]
    async fn login_route_is_public() {
        let (state, _) = crate::state::testing::fake();
        let app = router(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method(Method::POST)
                    .uri("/auth/login")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
