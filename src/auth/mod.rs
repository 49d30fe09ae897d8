use crate::state::AppState;
use axum::Router;

pub mod claims;
mod dto;
pub mod error;
pub mod extractors;
pub mod gate;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod principal;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
