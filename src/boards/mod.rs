pub mod dto;
pub mod handlers;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::board_routes())
        .merge(handlers::member_routes())
        .merge(handlers::task_routes())
}
