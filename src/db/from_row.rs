//! Row mapping for the tables this crate reads.
//!
//! Each `*_COLS` constant lists columns in the order the matching
//! `FromRow` impl reads them, so queries stay in sync with the mapping.

use std::str::FromStr;

use rusqlite::{Connection, Params, Row};

use crate::error::Result;
use crate::models::*;

pub const SUBSCRIBER_COLS: &str = "id, company_id, company_username, router_id, plan_id, plan_name, plan_fee, installation_fee, full_name, phone_number, secret, end_date, active, reminder";

pub const PAYMENT_COLS: &str = "id, checkout_request_id, receipt_number, amount, phone_number, used_status, company_id, customer_id, router_id, created_at";

pub const ROUTER_COLS: &str = "id, ip_address, username, router_secret, port, status";

pub const PAYHERO_SETTINGS_COLS: &str = "company_id, channel_id, payhero_token, pppoe_callback_url";

pub const AUDIT_LOG_COLS: &str = "id, timestamp, actor_type, action, subscriber_id, router_id, description";

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Parse a TEXT column into a strum-backed enum.
fn parse_enum<T: FromStr>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl FromRow for Subscriber {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscriber {
            id: row.get(0)?,
            company_id: row.get(1)?,
            company_username: row.get(2)?,
            router_id: row.get(3)?,
            plan_id: row.get(4)?,
            plan_name: row.get(5)?,
            plan_fee: row.get(6)?,
            installation_fee: row.get(7)?,
            full_name: row.get(8)?,
            phone_number: row.get(9)?,
            secret: row.get(10)?,
            end_date: row.get(11)?,
            active: row.get(12)?,
            reminder: row.get(13)?,
        })
    }
}

impl FromRow for PaymentRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentRecord {
            id: row.get(0)?,
            checkout_request_id: row.get(1)?,
            receipt_number: row.get(2)?,
            amount: row.get(3)?,
            phone_number: row.get(4)?,
            used_status: parse_enum(row, 5)?,
            company_id: row.get(6)?,
            customer_id: row.get(7)?,
            router_id: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

impl FromRow for RouterCredential {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(RouterCredential {
            id: row.get(0)?,
            ip_address: row.get(1)?,
            username: row.get(2)?,
            router_secret: row.get(3)?,
            port: row.get(4)?,
            status: row.get(5)?,
        })
    }
}

impl FromRow for PayHeroSettings {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PayHeroSettings {
            company_id: row.get(0)?,
            channel_id: row.get(1)?,
            payhero_token: row.get(2)?,
            pppoe_callback_url: row.get(3)?,
        })
    }
}

impl FromRow for AuditLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AuditLog {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            actor_type: parse_enum(row, 2)?,
            action: row.get(3)?,
            subscriber_id: row.get(4)?,
            router_id: row.get(5)?,
            description: row.get(6)?,
        })
    }
}

pub fn query_one<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(T::from_row(row)?)),
        None => Ok(None),
    }
}

pub fn query_all<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| T::from_row(row))?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}
