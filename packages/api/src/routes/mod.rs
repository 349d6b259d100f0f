pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Producer routes, mounted at the root and again under `/api`.
pub fn api_routes() -> Router<AppState> {
    jobs::router()
}
