use axum::extract::State;
use chrono::Utc;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::models::{RouterCredential, Subscriber};

pub async fn list_active_routers(
    State(state): State<AppState>,
) -> Result<Json<Vec<RouterCredential>>> {
    let conn = state.db.get()?;
    let routers = queries::list_active_routers(&conn)?;
    Ok(Json(routers))
}

/// Active subscribers on a router whose service has already lapsed.
pub async fn list_expired_subscribers(
    State(state): State<AppState>,
    Path(router_id): Path<i64>,
) -> Result<Json<Vec<Subscriber>>> {
    let conn = state.db.get()?;
    queries::get_router_by_id(&conn, router_id)?
        .ok_or_else(|| AppError::NotFound("Router not found".into()))?;
    let expired = queries::list_expired_by_router(&conn, router_id, Utc::now().timestamp())?;
    Ok(Json(expired))
}
