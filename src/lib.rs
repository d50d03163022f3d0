pub mod config;
pub mod db;
pub mod device;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod jobs;
pub mod messaging;
pub mod models;
pub mod payments;
pub mod pipeline;
pub mod util;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::AppState;

/// The full application with its shared state and middleware attached.
pub fn app(state: AppState) -> Router {
    handlers::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
