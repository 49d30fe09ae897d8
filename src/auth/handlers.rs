use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use super::{
    dto::{AuthResponse, LoginRequest, MeResponse},
    extractors::AuthUser,
    principal::{Credential, PrincipalResolver},
};
use crate::{error::ApiError, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

/// 3 to 32 characters of letters, digits, `_`, `.` or `-`.
pub fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(payload) = payload?;
    let username = payload.username.trim().to_string();

    if !is_valid_username(&username) {
        warn!(username = %username, "invalid username");
        return Err(ApiError::BadRequest(
            "Username must be 3-32 letters, digits, '_', '.' or '-'".into(),
        ));
    }
    if payload.password.is_empty() {
        warn!(username = %username, "empty password");
        return Err(ApiError::BadRequest("Password must not be empty".into()));
    }

    let credential = Credential {
        username,
        password: payload.password,
    };
    let (principal, provisioned) = PrincipalResolver::new(&*state.store, &*state.hasher)
        .resolve_or_provision_on_login(&credential)
        .await?;

    let token = state
        .keys
        .sign_for(principal.username(), principal.id(), state.clock.now())?;

    info!(user_id = %principal.id(), provisioned, "user logged in");
    Ok(Json(AuthResponse {
        id: principal.id(),
        username: principal.username().to_string(),
        token,
    }))
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(principal): AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        id: principal.id(),
        username: principal.username().to_string(),
        role: principal.role(),
    })
}
