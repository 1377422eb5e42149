mod app;
mod auth;
mod campaigns;
mod config;
mod error;
mod middleware;
mod pagination;
mod schools;
mod state;
mod storage;
mod store;
mod updates;
mod upload;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "schoolfund=debug,axum=info,tower_http=info".to_string());
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

    let app_state = AppState::init().await?;

    // Drop expired rate-limit windows once per window.
    let limiter = app_state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(limiter.window());
        loop {
            ticker.tick().await;
            let removed = limiter.prune();
            if removed > 0 {
                tracing::debug!(removed, "pruned rate-limit windows");
            }
        }
    });

    let app = app::build_app(app_state);
    app::serve(app).await
}
