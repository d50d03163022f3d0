mod routers;
mod sweeps;

pub use routers::*;
pub use sweeps::*;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/routers/active", get(list_active_routers))
        .route("/api/expired/{router_id}", get(list_expired_subscribers))
        .route("/api/update-status", patch(update_status))
        .route("/api/send-reminders", post(send_sms_reminders))
        .route("/api/send-whatsapp-reminders", post(send_whatsapp_reminders))
        .route("/api/expire", post(run_expiry))
}
