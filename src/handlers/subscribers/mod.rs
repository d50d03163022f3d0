mod audit_logs;
mod devices;
mod payments;

pub use audit_logs::*;
pub use devices::*;
pub use payments::*;

use axum::{
    Router,
    routing::{get, post},
};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/confirm-payment", post(confirm_payment_manually))
        .route("/api/subscribers/{id}/device", post(apply_device_action))
        .route("/api/audit-logs", get(query_audit_logs))
}
