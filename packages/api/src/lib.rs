//! Producer interface for the video job queue.
//!
//! Every front-end replica runs this crate: it accepts prompts, answers
//! status polls for any job and streams finished videos, talking only to the
//! shared job store and artifact store.

pub mod config;
pub mod error;
pub mod producer;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderName, StatusCode};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use producer::Producer;
pub use state::AppState;

/// Build the full application router with its middleware stack.
pub fn build_app(producer: Producer, config: ServerConfig) -> Router {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let state = AppState {
        producer,
        config: Arc::new(config),
    };

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::health::router())
        .merge(routes::api_routes())
        .nest("/api", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state)
}
