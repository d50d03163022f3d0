//! Subscription extension: turn one confirmed payment into one more month
//! of service.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{PaymentRecord, Subscriber, UsedStatus};
use crate::util::{add_months, format_local, local_time};

/// A committed extension.
#[derive(Debug, Clone, Serialize)]
pub struct Extension {
    pub subscriber_id: i64,
    pub router_id: i64,
    pub receipt: String,
    pub previous_end_date: i64,
    pub new_end_date: i64,
    /// `new_end_date` rendered in the business timezone
    pub new_end_date_local: String,
    /// The payment as consumed by this extension
    #[serde(skip)]
    pub payment: PaymentRecord,
}

/// New expiry for a subscriber: one calendar month past the later of now and
/// the current expiry, so lapsed subscribers are not billed for the gap.
pub fn next_end_date(current_end_date: i64, now: DateTime<Tz>) -> Result<DateTime<Tz>> {
    let current = local_time(current_end_date, now.timezone());
    let base = if current < now { now } else { current };
    add_months(base, 1)
        .ok_or_else(|| AppError::Internal(format!("Cannot add a month to {}", base)))
}

/// Extend a subscription using the payment identified by `receipt`.
pub fn extend_subscription(
    conn: &mut Connection,
    subscriber_id: i64,
    receipt: &str,
    tz: Tz,
) -> Result<Extension> {
    extend_subscription_at(conn, subscriber_id, receipt, Utc::now().with_timezone(&tz))
}

/// Same as [`extend_subscription`] with an explicit clock.
///
/// Consuming the payment and moving the expiry commit in one IMMEDIATE
/// transaction. The consume step is a conditional update, so of several
/// concurrent calls for the same receipt exactly one succeeds and the others
/// get `AlreadyConsumed` without touching the subscriber.
pub fn extend_subscription_at(
    conn: &mut Connection,
    subscriber_id: i64,
    receipt: &str,
    now: DateTime<Tz>,
) -> Result<Extension> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let subscriber: Subscriber = queries::get_subscriber_by_id(&tx, subscriber_id)?
        .ok_or_else(|| AppError::NotFound("Subscriber not found".into()))?;
    let router_id = subscriber
        .router_id
        .ok_or_else(|| AppError::NotFound("Subscriber has no router assigned".into()))?;

    let mut payment: PaymentRecord = queries::get_payment_by_receipt(&tx, receipt)?
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))?;

    if !queries::try_consume_payment(&tx, payment.id, &subscriber)? {
        tracing::warn!(
            subscriber_id,
            receipt,
            consumed_by = ?payment.customer_id,
            "Payment already consumed, refusing to extend again"
        );
        return Err(AppError::AlreadyConsumed(receipt.to_string()));
    }

    let new_end = next_end_date(subscriber.end_date, now)?;
    if !queries::extend_subscriber(&tx, subscriber_id, new_end.timestamp())? {
        return Err(AppError::NotFound("Subscriber not found".into()));
    }

    tx.commit()?;

    payment.used_status = UsedStatus::Used;
    payment.company_id = subscriber.company_id;
    payment.customer_id = Some(subscriber.id);
    payment.router_id = subscriber.router_id;

    let extension = Extension {
        subscriber_id,
        router_id,
        receipt: receipt.to_string(),
        previous_end_date: subscriber.end_date,
        new_end_date: new_end.timestamp(),
        new_end_date_local: format_local(new_end.timestamp(), now.timezone()),
        payment,
    };

    tracing::info!(
        subscriber_id,
        router_id,
        receipt,
        new_end_date = %extension.new_end_date_local,
        "Subscription extended"
    );

    Ok(extension)
}
