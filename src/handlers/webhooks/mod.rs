mod payhero;

pub use payhero::*;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/callback/payhero", post(handle_payhero_callback))
}
