use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{
    AUDIT_LOG_COLS, PAYHERO_SETTINGS_COLS, PAYMENT_COLS, ROUTER_COLS,
    SUBSCRIBER_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Routers ============

pub fn create_router(conn: &Connection, input: &CreateRouter) -> Result<RouterCredential> {
    conn.execute(
        "INSERT INTO routers (ip_address, username, router_secret, port, status)
         VALUES (?1, ?2, ?3, ?4, 1)",
        params![&input.ip_address, &input.username, &input.router_secret, input.port],
    )?;

    Ok(RouterCredential {
        id: conn.last_insert_rowid(),
        ip_address: input.ip_address.clone(),
        username: input.username.clone(),
        router_secret: input.router_secret.clone(),
        port: input.port,
        status: true,
    })
}

pub fn get_router_by_id(conn: &Connection, id: i64) -> Result<Option<RouterCredential>> {
    query_one(
        conn,
        &format!("SELECT {} FROM routers WHERE id = ?1", ROUTER_COLS),
        [id],
    )
}

pub fn list_active_routers(conn: &Connection) -> Result<Vec<RouterCredential>> {
    query_all(
        conn,
        &format!("SELECT {} FROM routers WHERE status = 1 ORDER BY id", ROUTER_COLS),
        [],
    )
}

// ============ Subscribers ============

pub fn create_subscriber(conn: &Connection, input: &CreateSubscriber) -> Result<Subscriber> {
    conn.execute(
        "INSERT INTO pppoe_clients (company_id, company_username, router_id, plan_id, plan_name, plan_fee, installation_fee, full_name, phone_number, secret, end_date, active, reminder)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1)",
        params![
            input.company_id,
            &input.company_username,
            input.router_id,
            input.plan_id,
            &input.plan_name,
            input.plan_fee,
            input.installation_fee,
            &input.full_name,
            &input.phone_number,
            &input.secret,
            input.end_date,
            input.active,
        ],
    )?;

    Ok(Subscriber {
        id: conn.last_insert_rowid(),
        company_id: input.company_id,
        company_username: input.company_username.clone(),
        router_id: input.router_id,
        plan_id: input.plan_id,
        plan_name: input.plan_name.clone(),
        plan_fee: input.plan_fee,
        installation_fee: input.installation_fee,
        full_name: input.full_name.clone(),
        phone_number: input.phone_number.clone(),
        secret: input.secret.clone(),
        end_date: input.end_date,
        active: input.active,
        reminder: true,
    })
}

pub fn get_subscriber_by_id(conn: &Connection, id: i64) -> Result<Option<Subscriber>> {
    query_one(
        conn,
        &format!("SELECT {} FROM pppoe_clients WHERE id = ?1", SUBSCRIBER_COLS),
        [id],
    )
}

/// Write the result of a confirmed payment: clear the installation fee and
/// move the expiry. Returns false if the subscriber row is gone.
pub fn extend_subscriber(conn: &Connection, id: i64, new_end_date: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE pppoe_clients SET installation_fee = 0, end_date = ?1 WHERE id = ?2",
        params![new_end_date, id],
    )?;
    Ok(affected > 0)
}

pub fn set_subscriber_active(conn: &Connection, id: i64, active: bool) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE pppoe_clients SET active = ?1 WHERE id = ?2",
        params![active, id],
    )?;
    Ok(affected > 0)
}

/// Bulk-deactivate subscribers. Returns the ids that actually matched a row.
pub fn mark_subscribers_inactive(conn: &Connection, ids: &[i64]) -> Result<Vec<i64>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "UPDATE pppoe_clients SET active = 0 WHERE id IN ({}) RETURNING id",
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let updated = stmt
        .query_map(rusqlite::params_from_iter(ids.iter()), |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(updated)
}

/// Active subscribers on an enabled router whose service ended before `now`.
pub fn list_expired_by_router(conn: &Connection, router_id: i64, now: i64) -> Result<Vec<Subscriber>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM pppoe_clients pc
             WHERE pc.router_id = ?1 AND pc.end_date < ?2 AND pc.active = 1
               AND EXISTS (SELECT 1 FROM routers r WHERE r.id = pc.router_id AND r.status = 1)
             ORDER BY pc.id",
            prefixed_subscriber_cols()
        ),
        params![router_id, now],
    )
}

/// Active subscribers (on enabled routers) expiring within `[from, to]`.
pub fn list_near_expiry(conn: &Connection, from: i64, to: i64) -> Result<Vec<Subscriber>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM pppoe_clients pc
             INNER JOIN routers r ON pc.router_id = r.id
             WHERE pc.end_date >= ?1 AND pc.end_date <= ?2 AND r.status = 1 AND pc.active = 1
               AND pc.reminder = 1
             ORDER BY pc.end_date",
            prefixed_subscriber_cols()
        ),
        params![from, to],
    )
}

fn prefixed_subscriber_cols() -> String {
    SUBSCRIBER_COLS
        .split(", ")
        .map(|c| format!("pc.{}", c))
        .collect::<Vec<_>>()
        .join(", ")
}

// ============ Payment Records ============

/// Persist a confirmed payment. Duplicate deliveries for the same
/// CheckoutRequestID (or receipt) are ignored and return `None`.
pub fn create_payment_record(
    conn: &Connection,
    input: &CreatePaymentRecord,
) -> Result<Option<PaymentRecord>> {
    let created_at = now();
    let affected = conn.execute(
        "INSERT OR IGNORE INTO pppoe_payments (checkout_request_id, receipt_number, amount, phone_number, used_status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            &input.checkout_request_id,
            &input.receipt_number,
            input.amount,
            &input.phone_number,
            UsedStatus::Unused.as_ref(),
            created_at
        ],
    )?;

    if affected == 0 {
        return Ok(None);
    }

    Ok(Some(PaymentRecord {
        id: conn.last_insert_rowid(),
        checkout_request_id: input.checkout_request_id.clone(),
        receipt_number: input.receipt_number.clone(),
        amount: input.amount,
        phone_number: input.phone_number.clone(),
        used_status: UsedStatus::Unused,
        company_id: None,
        customer_id: None,
        router_id: None,
        created_at,
    }))
}

pub fn get_payment_by_checkout_id(
    conn: &Connection,
    checkout_request_id: &str,
) -> Result<Option<PaymentRecord>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM pppoe_payments WHERE checkout_request_id = ?1",
            PAYMENT_COLS
        ),
        [checkout_request_id],
    )
}

pub fn get_payment_by_receipt(conn: &Connection, receipt: &str) -> Result<Option<PaymentRecord>> {
    query_one(
        conn,
        &format!("SELECT {} FROM pppoe_payments WHERE receipt_number = ?1", PAYMENT_COLS),
        [receipt],
    )
}

/// Atomically consume a payment and stamp it with the subscriber it paid for.
///
/// Compare-and-swap on `used_status`, so a duplicate confirmation cannot
/// extend a subscription twice.
///
/// Returns:
/// - `Ok(true)` if this call consumed the payment
/// - `Ok(false)` if it was already consumed (or does not exist)
pub fn try_consume_payment(conn: &Connection, payment_id: i64, subscriber: &Subscriber) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE pppoe_payments
         SET used_status = ?1, company_id = ?2, customer_id = ?3, router_id = ?4
         WHERE id = ?5 AND used_status = ?6",
        params![
            UsedStatus::Used.as_ref(),
            subscriber.company_id,
            subscriber.id,
            subscriber.router_id,
            payment_id,
            UsedStatus::Unused.as_ref()
        ],
    )?;
    Ok(affected > 0)
}

// ============ Payment Requests ============

pub fn create_payment_request(
    conn: &Connection,
    subscriber: &Subscriber,
    success: bool,
    status: Option<&str>,
    reference: Option<&str>,
    checkout_request_id: Option<&str>,
) -> Result<PaymentRequest> {
    let created_at = now();
    let payment_type = if subscriber.installation_fee > 0 {
        PaymentType::First
    } else {
        PaymentType::Repeat
    };

    conn.execute(
        "INSERT INTO pppoe_payment_requests
         (success, status, reference, checkout_request_id, company_id, company_username, router_id,
          plan_id, plan_name, phone_number, payment_type, installation_fee, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            success,
            status,
            reference,
            checkout_request_id,
            subscriber.company_id,
            &subscriber.company_username,
            subscriber.router_id,
            subscriber.plan_id,
            &subscriber.plan_name,
            &subscriber.phone_number,
            payment_type.as_ref(),
            subscriber.installation_fee,
            created_at
        ],
    )?;

    Ok(PaymentRequest {
        id: conn.last_insert_rowid(),
        success,
        status: status.map(String::from),
        reference: reference.map(String::from),
        checkout_request_id: checkout_request_id.map(String::from),
        company_id: subscriber.company_id,
        company_username: subscriber.company_username.clone(),
        router_id: subscriber.router_id,
        plan_id: subscriber.plan_id,
        plan_name: subscriber.plan_name.clone(),
        phone_number: subscriber.phone_number.clone(),
        payment_type,
        installation_fee: subscriber.installation_fee,
        created_at,
    })
}

// ============ PayHero Settings ============

pub fn get_payhero_settings(conn: &Connection, company_id: i64) -> Result<Option<PayHeroSettings>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payhero_settings WHERE company_id = ?1",
            PAYHERO_SETTINGS_COLS
        ),
        [company_id],
    )
}

pub fn upsert_payhero_settings(conn: &Connection, settings: &PayHeroSettings) -> Result<()> {
    conn.execute(
        "INSERT INTO payhero_settings (company_id, channel_id, payhero_token, pppoe_callback_url)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(company_id) DO UPDATE SET
            channel_id = excluded.channel_id,
            payhero_token = excluded.payhero_token,
            pppoe_callback_url = excluded.pppoe_callback_url",
        params![
            settings.company_id,
            settings.channel_id,
            &settings.payhero_token,
            &settings.pppoe_callback_url
        ],
    )?;
    Ok(())
}

// ============ Audit Logs ============

pub fn create_audit_log(
    conn: &Connection,
    enabled: bool,
    actor_type: ActorType,
    action: &str,
    subscriber_id: Option<i64>,
    router_id: Option<i64>,
    description: &str,
) -> Result<AuditLog> {
    let log = AuditLog {
        id: gen_id(),
        timestamp: now(),
        actor_type,
        action: action.to_string(),
        subscriber_id,
        router_id,
        description: description.to_string(),
    };

    // Skip database insert if audit logging is disabled
    if !enabled {
        return Ok(log);
    }

    conn.execute(
        "INSERT INTO audit_logs (id, timestamp, actor_type, action, subscriber_id, router_id, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &log.id,
            log.timestamp,
            log.actor_type.as_ref(),
            &log.action,
            log.subscriber_id,
            log.router_id,
            &log.description
        ],
    )?;

    Ok(log)
}

pub fn query_audit_logs(conn: &Connection, query: &AuditLogQuery) -> Result<Vec<AuditLog>> {
    let mut sql = format!("SELECT {} FROM audit_logs WHERE 1=1", AUDIT_LOG_COLS);
    let mut filter_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(subscriber_id) = query.subscriber_id {
        filter_params.push(Box::new(subscriber_id));
        sql.push_str(&format!(" AND subscriber_id = ?{}", filter_params.len()));
    }
    if let Some(router_id) = query.router_id {
        filter_params.push(Box::new(router_id));
        sql.push_str(&format!(" AND router_id = ?{}", filter_params.len()));
    }

    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    filter_params.push(Box::new(limit));
    sql.push_str(&format!(
        " ORDER BY timestamp DESC, rowid DESC LIMIT ?{}",
        filter_params.len()
    ));

    query_all(
        conn,
        &sql,
        rusqlite::params_from_iter(filter_params.iter().map(|p| p.as_ref())),
    )
}
