pub mod pppoe;
pub mod public;
pub mod subscribers;
pub mod webhooks;

use axum::Router;

use crate::db::AppState;

/// Every HTTP and WebSocket route, ready for `with_state`.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(public::router())
        .merge(webhooks::router())
        .merge(subscribers::router())
        .merge(pppoe::router())
}
