use std::sync::Arc;

use crate::config::ServerConfig;
use crate::producer::Producer;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub producer: Producer,
    pub config: Arc<ServerConfig>,
}
