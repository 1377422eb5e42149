pub mod handlers;
pub mod poller;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::upload_routes()
}
