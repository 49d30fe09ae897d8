mod app;
mod auth;
mod boards;
mod clock;
mod config;
mod error;
mod policy;
mod state;
mod store;
mod tasks;
mod users;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "taskboard=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    tracing::info!(
        issuer = %config.jwt.issuer,
        ttl_minutes = config.jwt.ttl_minutes,
        persistent = config.database_url.is_some(),
        "configuration loaded"
    );

    let state = AppState::init(&config).await?;
    app::serve(app::build_app(state)).await
}
