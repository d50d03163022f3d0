use axum::extract::State;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path};
use crate::models::ActorType;
use crate::pipeline::{DeviceAction, Reconciled, reconcile_device};

/// Enable, disable or re-plan a subscriber's session on their router.
/// Router failures surface as 502 and leave the stored state untouched.
pub async fn apply_device_action(
    State(state): State<AppState>,
    Path(subscriber_id): Path<i64>,
    Json(action): Json<DeviceAction>,
) -> Result<Json<Reconciled>> {
    let done = reconcile_device(&state, subscriber_id, &action, ActorType::Operator).await?;
    Ok(Json(done))
}
