pub mod dto;
pub mod handlers;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::task_routes())
        .merge(handlers::assignment_routes())
        .merge(handlers::query_routes())
}
