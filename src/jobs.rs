//! Scheduled work around the reconciliation core: disabling expired
//! subscribers and sending renewal reminders. Scheduling itself is left to
//! cron (see the `expire` and `send-reminders` CLI commands).

use chrono::{DateTime, Days, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::messaging::{DeliveryReport, MessageChannel};
use crate::models::{ActorType, ExpiredSubscriber};
use crate::pipeline::{DeviceAction, reconcile_device};

#[derive(Debug, Clone, Serialize)]
pub struct ExpiryFailure {
    pub subscriber_id: i64,
    pub error: String,
}

/// Result of sweeping one router.
#[derive(Debug, Clone, Serialize)]
pub struct ExpiryReport {
    pub router_id: i64,
    pub expired: usize,
    pub disabled: Vec<i64>,
    /// Left active so the next run tries again
    pub failed: Vec<ExpiryFailure>,
    pub notices: DeliveryReport,
}

/// Disable every expired, still-active subscriber on one router.
///
/// Each subscriber is handled independently: a router command that fails
/// leaves that subscriber marked active so the next run retries it.
pub async fn expire_router(state: &AppState, router_id: i64, now: i64) -> Result<ExpiryReport> {
    let expired = {
        let conn = state.db.get()?;
        queries::list_expired_by_router(&conn, router_id, now)?
    };

    let mut disabled = Vec::new();
    let mut notify = Vec::new();
    let mut failed = Vec::new();

    for subscriber in &expired {
        match reconcile_device(state, subscriber.id, &DeviceAction::Disable, ActorType::System).await {
            Ok(_) => {
                disabled.push(subscriber.id);
                notify.push(ExpiredSubscriber::from(subscriber));
            }
            Err(e) => {
                tracing::warn!(router_id, subscriber_id = subscriber.id, error = %e, "Could not disable expired subscriber");
                failed.push(ExpiryFailure {
                    subscriber_id: subscriber.id,
                    error: e.to_string(),
                });
            }
        }
    }

    let notices = state.messaging.send_disconnection_notices(&notify).await;

    tracing::info!(
        router_id,
        expired = expired.len(),
        disabled = disabled.len(),
        failed = failed.len(),
        "Expiry sweep finished"
    );

    Ok(ExpiryReport {
        router_id,
        expired: expired.len(),
        disabled,
        failed,
        notices,
    })
}

/// Sweep every active router.
pub async fn expire_all(state: &AppState, now: i64) -> Result<Vec<ExpiryReport>> {
    let routers = {
        let conn = state.db.get()?;
        queries::list_active_routers(&conn)?
    };

    let mut reports = Vec::with_capacity(routers.len());
    for router in routers {
        reports.push(expire_router(state, router.id, now).await?);
    }
    Ok(reports)
}

/// Mark subscribers inactive whose sessions were already disabled elsewhere,
/// then notify the ones listed in `expired_users`.
pub async fn mark_inactive(
    state: &AppState,
    ids: &[i64],
    expired_users: &[ExpiredSubscriber],
) -> Result<(usize, DeliveryReport)> {
    if ids.is_empty() {
        return Err(AppError::BadRequest("No IDs provided".into()));
    }

    let updated = {
        let mut conn = state.db.get()?;
        let tx = conn.transaction()?;
        let updated = queries::mark_subscribers_inactive(&tx, ids)?;
        if updated.is_empty() {
            return Err(AppError::NotFound("No records found to update".into()));
        }
        for id in &updated {
            queries::create_audit_log(
                &tx,
                state.audit_log_enabled,
                ActorType::Operator,
                "subscriber.deactivate",
                Some(*id),
                None,
                "Marked inactive after expiry",
            )?;
        }
        tx.commit()?;
        updated
    };

    let notices = state.messaging.send_disconnection_notices(expired_users).await;
    Ok((updated.len(), notices))
}

/// Unix bounds of the reminder window: start of day `start_days` from today
/// through the end of day `end_days` from today, in the business timezone.
pub fn reminder_window(now: DateTime<Tz>, (start_days, end_days): (i64, i64)) -> Option<(i64, i64)> {
    let tz = now.timezone();
    let today = now.date_naive();
    let day = |offset: i64| -> Option<chrono::NaiveDate> {
        if offset >= 0 {
            today.checked_add_days(Days::new(offset as u64))
        } else {
            today.checked_sub_days(Days::new(offset.unsigned_abs()))
        }
    };

    let start = tz
        .from_local_datetime(&day(start_days)?.and_hms_opt(0, 0, 0)?)
        .earliest()?;
    let end = tz
        .from_local_datetime(&day(end_days)?.and_hms_opt(23, 59, 59)?)
        .latest()?;
    Some((start.timestamp(), end.timestamp()))
}

/// Send renewal reminders to subscribers expiring inside the configured window.
pub async fn send_reminders(state: &AppState, channel: MessageChannel) -> Result<DeliveryReport> {
    let now = Utc::now().with_timezone(&state.business_tz);
    let (from, to) = reminder_window(now, state.reminder_window_days)
        .ok_or_else(|| AppError::Internal("Invalid reminder window".into()))?;

    let subscribers = {
        let conn = state.db.get()?;
        queries::list_near_expiry(&conn, from, to)?
    };

    Ok(state.messaging.send_reminders(channel, &subscribers).await)
}
