use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::jobs::{self, ExpiryReport};
use crate::messaging::{DeliveryReport, MessageChannel};
use crate::models::ExpiredSubscriber;

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub ids: Vec<i64>,
    #[serde(default)]
    pub expired_users: Vec<ExpiredSubscriber>,
}

#[derive(Debug, Serialize)]
pub struct UpdateStatusResponse {
    pub message: String,
    pub updated: usize,
    pub notices: DeliveryReport,
}

/// Mark subscribers inactive after an external sweep disabled them on the
/// router, and send their disconnection notices.
pub async fn update_status(
    State(state): State<AppState>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<UpdateStatusResponse>> {
    let (updated, notices) = jobs::mark_inactive(&state, &request.ids, &request.expired_users).await?;
    Ok(Json(UpdateStatusResponse {
        message: format!("Updated {} subscriber(s)", updated),
        updated,
        notices,
    }))
}

pub async fn send_sms_reminders(State(state): State<AppState>) -> Result<Json<DeliveryReport>> {
    let report = jobs::send_reminders(&state, MessageChannel::Sms).await?;
    Ok(Json(report))
}

pub async fn send_whatsapp_reminders(State(state): State<AppState>) -> Result<Json<DeliveryReport>> {
    let report = jobs::send_reminders(&state, MessageChannel::Whatsapp).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct ExpireParams {
    pub router_id: Option<i64>,
}

/// Run the expiry sweep for one router, or for every active router.
pub async fn run_expiry(
    State(state): State<AppState>,
    Query(params): Query<ExpireParams>,
) -> Result<Json<Vec<ExpiryReport>>> {
    let now = Utc::now().timestamp();
    let reports = match params.router_id {
        Some(router_id) => vec![jobs::expire_router(&state, router_id, now).await?],
        None => jobs::expire_all(&state, now).await?,
    };
    Ok(Json(reports))
}
