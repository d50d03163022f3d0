//! Device reconciliation: bring a subscriber's router session in line with
//! their billing state. Strictly best-effort relative to billing.

use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::device::{DeviceChannel, PlanProfile, RouterCommand, SessionName};
use crate::error::{AppError, Result};
use crate::models::{ActorType, RouterCredential};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeviceAction {
    Enable,
    Disable,
    ChangePlan { plan: String },
}

impl DeviceAction {
    fn audit_action(&self) -> &'static str {
        match self {
            DeviceAction::Enable => "device.enable",
            DeviceAction::Disable => "device.disable",
            DeviceAction::ChangePlan { .. } => "device.change_plan",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reconciled {
    pub subscriber_id: i64,
    pub router_id: i64,
    pub description: String,
}

/// Device state after a billing event. A pending device never fails the
/// billing operation that triggered it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeviceOutcome {
    Reconciled { description: String },
    Pending { reason: String },
}

impl DeviceOutcome {
    pub fn is_reconciled(&self) -> bool {
        matches!(self, DeviceOutcome::Reconciled { .. })
    }
}

/// Enable or disable a subscriber's PPP secret. Enabling an enabled secret is a no-op.
pub async fn set_session_enabled(
    channel: &dyn DeviceChannel,
    router: &RouterCredential,
    name: &SessionName,
    enabled: bool,
) -> Result<String> {
    let command = if enabled {
        RouterCommand::enable(name.clone())
    } else {
        RouterCommand::disable(name.clone())
    };
    run(channel, router, command).await
}

/// Drop the subscriber's live session. Succeeds when no session exists.
pub async fn terminate_active_session(
    channel: &dyn DeviceChannel,
    router: &RouterCredential,
    name: &SessionName,
) -> Result<String> {
    run(channel, router, RouterCommand::RemoveActiveSession { name: name.clone() }).await
}

/// Move the subscriber's PPP secret to another profile.
pub async fn change_plan_profile(
    channel: &dyn DeviceChannel,
    router: &RouterCredential,
    name: &SessionName,
    plan: &PlanProfile,
) -> Result<String> {
    run(
        channel,
        router,
        RouterCommand::SetSecretProfile {
            name: name.clone(),
            profile: plan.clone(),
        },
    )
    .await
}

async fn run(
    channel: &dyn DeviceChannel,
    router: &RouterCredential,
    command: RouterCommand,
) -> Result<String> {
    match channel.execute(router, &command).await {
        Ok(_) => {
            let description = command.describe();
            tracing::info!(router_id = router.id, session = %command.session_name(), "{}", description);
            Ok(description)
        }
        Err(e) => {
            tracing::warn!(
                router_id = router.id,
                session = %command.session_name(),
                error = %e,
                "Router command failed"
            );
            Err(e)
        }
    }
}

/// Apply `action` to a subscriber's router session, then record the new state.
///
/// The device command runs with no database connection held. The `active`
/// flag and audit entry are written afterwards in their own statements; if
/// that write fails the device command is simply repeated on retry.
pub async fn reconcile_device(
    state: &AppState,
    subscriber_id: i64,
    action: &DeviceAction,
    actor: ActorType,
) -> Result<Reconciled> {
    let (subscriber, router) = {
        let conn = state.db.get()?;
        let subscriber = queries::get_subscriber_by_id(&conn, subscriber_id)?
            .ok_or_else(|| AppError::NotFound("Subscriber not found".into()))?;
        let router_id = subscriber
            .router_id
            .ok_or_else(|| AppError::NotFound("Subscriber has no router assigned".into()))?;
        let router = queries::get_router_by_id(&conn, router_id)?
            .ok_or_else(|| AppError::NotFound("Router not found".into()))?;
        (subscriber, router)
    };

    let name = SessionName::parse(&subscriber.secret)?;
    let channel = state.devices.as_ref();

    let (description, active) = match action {
        DeviceAction::Enable => (set_session_enabled(channel, &router, &name, true).await?, Some(true)),
        DeviceAction::Disable => {
            let disabled = set_session_enabled(channel, &router, &name, false).await?;
            terminate_active_session(channel, &router, &name).await?;
            (disabled, Some(false))
        }
        DeviceAction::ChangePlan { plan } => {
            let plan = PlanProfile::parse(plan)?;
            // Reconnecting picks up the new profile
            terminate_active_session(channel, &router, &name).await?;
            (change_plan_profile(channel, &router, &name, &plan).await?, None)
        }
    };

    let conn = state.db.get()?;
    if let Some(active) = active {
        queries::set_subscriber_active(&conn, subscriber.id, active)?;
    }
    queries::create_audit_log(
        &conn,
        state.audit_log_enabled,
        actor,
        action.audit_action(),
        Some(subscriber.id),
        Some(router.id),
        &description,
    )?;

    Ok(Reconciled {
        subscriber_id: subscriber.id,
        router_id: router.id,
        description,
    })
}

/// Re-enable service after a payment. Failures are reported, not raised.
pub async fn restore_service(state: &AppState, subscriber_id: i64) -> DeviceOutcome {
    match reconcile_device(state, subscriber_id, &DeviceAction::Enable, ActorType::Customer).await {
        Ok(done) => DeviceOutcome::Reconciled {
            description: done.description,
        },
        Err(e) => {
            if e.is_device_failure() {
                tracing::warn!(subscriber_id, error = %e, "Service restore pending");
            } else {
                tracing::error!(subscriber_id, error = %e, "Service restore failed");
            }
            DeviceOutcome::Pending {
                reason: e.to_string(),
            }
        }
    }
}
