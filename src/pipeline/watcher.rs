//! Payment watcher: wait for the gateway confirmation of a payment request
//! that was initiated elsewhere, then run the extend and reconcile steps.

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::models::{ActorType, PaymentRecord};

use super::extend::{Extension, extend_subscription};
use super::reconcile::{DeviceOutcome, restore_service};

/// Everything that happened for one confirmed payment.
#[derive(Debug, Clone, Serialize)]
pub struct Confirmation {
    pub payment: PaymentRecord,
    pub extension: Extension,
    pub device: DeviceOutcome,
}

#[derive(Debug, Clone)]
pub enum WatchOutcome {
    Confirmed(Box<Confirmation>),
    /// Deadline passed without a matching payment
    NotFound,
    /// The caller went away; polling stopped
    Cancelled,
}

/// Poll for a payment with `checkout_request_id` until it appears, the
/// configured deadline passes, or `cancel` fires.
///
/// Only reads the payment table while polling. On a match the payment is
/// consumed exactly once via [`confirm_payment`].
pub async fn watch_payment(
    state: &AppState,
    checkout_request_id: &str,
    subscriber_id: i64,
    cancel: &CancellationToken,
) -> Result<WatchOutcome> {
    let deadline = Instant::now() + state.watch.timeout;
    let mut polls = 0u32;

    loop {
        if cancel.is_cancelled() {
            tracing::debug!(checkout_request_id, polls, "Payment watch cancelled");
            return Ok(WatchOutcome::Cancelled);
        }

        polls += 1;
        let found = {
            let conn = state.db.get()?;
            queries::get_payment_by_checkout_id(&conn, checkout_request_id)?
        };

        if let Some(payment) = found {
            tracing::info!(
                checkout_request_id,
                subscriber_id,
                receipt = %payment.receipt_number,
                polls,
                "Payment confirmation found"
            );
            let confirmation = confirm_payment(state, subscriber_id, &payment.receipt_number).await?;
            return Ok(WatchOutcome::Confirmed(Box::new(confirmation)));
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::info!(checkout_request_id, subscriber_id, polls, "Payment watch timed out");
            return Ok(WatchOutcome::NotFound);
        }

        let wait = state.watch.poll_interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(checkout_request_id, polls, "Payment watch cancelled");
                return Ok(WatchOutcome::Cancelled);
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

/// Extend the subscription for `receipt`, then try to restore the session on
/// the router. Device problems end up in `Confirmation::device`.
pub async fn confirm_payment(
    state: &AppState,
    subscriber_id: i64,
    receipt: &str,
) -> Result<Confirmation> {
    let extension = {
        let mut conn = state.db.get()?;
        let extension = extend_subscription(&mut conn, subscriber_id, receipt, state.business_tz)?;

        if let Err(e) = queries::create_audit_log(
            &conn,
            state.audit_log_enabled,
            ActorType::Customer,
            "subscription.extend",
            Some(subscriber_id),
            Some(extension.router_id),
            &format!(
                "Payment {} extended service until {}",
                receipt, extension.new_end_date_local
            ),
        ) {
            tracing::warn!(subscriber_id, error = %e, "Failed to record extension audit log");
        }
        extension
    };

    // Billing is committed; nothing below may fail the confirmation
    let device = restore_service(state, subscriber_id).await;

    Ok(Confirmation {
        payment: extension.payment.clone(),
        extension,
        device,
    })
}
