mod from_row;
pub mod queries;

pub use from_row::*;

use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::config::{Config, WatchConfig};
use crate::device::DeviceChannel;
use crate::error::Result;
use crate::messaging::MessagingService;
use crate::payments::PayHeroClient;

pub type DbPool = Pool<SqliteConnectionManager>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handles for request handlers and jobs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub base_url: String,
    pub business_tz: Tz,
    pub watch: WatchConfig,
    pub audit_log_enabled: bool,
    pub devices: Arc<dyn DeviceChannel>,
    pub messaging: MessagingService,
    pub payhero: PayHeroClient,
    pub payhero_callback_token: Option<String>,
    pub reminder_window_days: (i64, i64),
}

impl AppState {
    pub fn new(config: &Config, db: DbPool, devices: Arc<dyn DeviceChannel>) -> Self {
        Self {
            db,
            base_url: config.base_url.clone(),
            business_tz: config.business_timezone,
            watch: config.watch,
            audit_log_enabled: config.audit_log_enabled,
            devices,
            messaging: MessagingService::new(
                config.sms.clone(),
                config.whatsapp.clone(),
                config.paybill_number.clone(),
                config.business_timezone,
            ),
            payhero: PayHeroClient::new(config.payhero_api_url.clone()),
            payhero_callback_token: config.payhero_callback_token.clone(),
            reminder_window_days: config.reminder_window_days,
        }
    }
}

/// Build the process-wide bounded pool. Every connection waits on locks
/// instead of failing immediately.
pub fn create_pool(path: &str, max_size: u32) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    let pool = Pool::builder().max_size(max_size).build(manager)?;
    Ok(pool)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS routers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ip_address TEXT NOT NULL,
            username TEXT NOT NULL,
            router_secret TEXT NOT NULL,
            port INTEGER NOT NULL DEFAULT 22,
            status INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS pppoe_clients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_id INTEGER,
            company_username TEXT NOT NULL,
            router_id INTEGER REFERENCES routers(id),
            plan_id INTEGER,
            plan_name TEXT,
            plan_fee INTEGER NOT NULL DEFAULT 0,
            installation_fee INTEGER NOT NULL DEFAULT 0,
            full_name TEXT NOT NULL,
            phone_number TEXT NOT NULL,
            secret TEXT NOT NULL,
            end_date INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            reminder INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_pppoe_clients_router ON pppoe_clients(router_id);
        CREATE INDEX IF NOT EXISTS idx_pppoe_clients_end_date ON pppoe_clients(end_date);

        CREATE TABLE IF NOT EXISTS pppoe_payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            checkout_request_id TEXT NOT NULL UNIQUE,
            receipt_number TEXT NOT NULL UNIQUE,
            amount INTEGER NOT NULL DEFAULT 0,
            phone_number TEXT,
            used_status TEXT NOT NULL DEFAULT 'unused',
            company_id INTEGER,
            customer_id INTEGER,
            router_id INTEGER,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pppoe_payment_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            success INTEGER NOT NULL,
            status TEXT,
            reference TEXT,
            checkout_request_id TEXT,
            company_id INTEGER,
            company_username TEXT NOT NULL,
            router_id INTEGER,
            plan_id INTEGER,
            plan_name TEXT,
            phone_number TEXT NOT NULL,
            payment_type TEXT NOT NULL,
            installation_fee INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payment_requests_checkout ON pppoe_payment_requests(checkout_request_id);

        CREATE TABLE IF NOT EXISTS payhero_settings (
            company_id INTEGER PRIMARY KEY,
            channel_id INTEGER NOT NULL,
            payhero_token TEXT NOT NULL,
            pppoe_callback_url TEXT
        );

        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            actor_type TEXT NOT NULL,
            action TEXT NOT NULL,
            subscriber_id INTEGER,
            router_id INTEGER,
            description TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_subscriber ON audit_logs(subscriber_id, timestamp);
        "#,
    )?;
    Ok(())
}
