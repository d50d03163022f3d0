//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{DateTime, TimeZone};
use chrono_tz::{Africa::Nairobi, Tz};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub use pppoe_billing::config::{Config, WatchConfig};
pub use pppoe_billing::db::{AppState, DbPool, create_pool, init_db, queries};
pub use pppoe_billing::device::{CommandOutput, DeviceChannel, RouterCommand};
pub use pppoe_billing::error::{AppError, Result};
pub use pppoe_billing::models::*;

pub const CALLBACK_TOKEN: &str = "test-callback-token";

/// How the fake router answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterMode {
    Accept,
    Unreachable,
    Reject,
}

/// In-memory stand-in for the routers. Records every command it is asked to
/// run, including ones it then fails.
pub struct RecordingChannel {
    mode: Mutex<RouterMode>,
    commands: Mutex<Vec<(i64, String)>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(RouterMode::Accept),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: RouterMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Rendered commands, in the order they were issued.
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn commands_for_router(&self, router_id: i64) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == router_id)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

#[async_trait]
impl DeviceChannel for RecordingChannel {
    async fn execute(
        &self,
        router: &RouterCredential,
        command: &RouterCommand,
    ) -> Result<CommandOutput> {
        self.commands
            .lock()
            .unwrap()
            .push((router.id, command.render()));

        let mode = *self.mode.lock().unwrap();
        match mode {
            RouterMode::Accept => Ok(CommandOutput::default()),
            RouterMode::Unreachable => Err(AppError::DeviceUnreachable(format!(
                "{}:{} connection refused",
                router.ip_address, router.port
            ))),
            RouterMode::Reject => Err(AppError::CommandFailed("failure: not permitted".into())),
        }
    }
}

/// A file-backed database plus app state wired to a [`RecordingChannel`].
/// Keep it alive for the duration of the test; dropping it removes the file.
pub struct TestEnv {
    _dir: TempDir,
    pub state: AppState,
    pub devices: Arc<RecordingChannel>,
}

impl TestEnv {
    pub fn conn(&self) -> PooledConnection<SqliteConnectionManager> {
        self.state.db.get().unwrap()
    }

    pub fn app(&self) -> Router {
        pppoe_billing::app(self.state.clone())
    }

    pub fn subscriber(&self, id: i64) -> Subscriber {
        queries::get_subscriber_by_id(&self.conn(), id)
            .unwrap()
            .expect("subscriber should exist")
    }

    pub fn payment(&self, receipt: &str) -> PaymentRecord {
        queries::get_payment_by_receipt(&self.conn(), receipt)
            .unwrap()
            .expect("payment should exist")
    }

    pub fn audit_logs(&self, subscriber_id: i64) -> Vec<AuditLog> {
        queries::query_audit_logs(
            &self.conn(),
            &AuditLogQuery {
                subscriber_id: Some(subscriber_id),
                router_id: None,
                limit: None,
            },
        )
        .unwrap()
    }
}

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: String::new(),
        db_pool_size: 4,
        base_url: "http://localhost:3000".to_string(),
        business_timezone: Nairobi,
        watch: WatchConfig {
            poll_interval: Duration::from_millis(20),
            timeout: Duration::from_millis(300),
        },
        device_timeout: Duration::from_secs(1),
        audit_log_enabled: true,
        payhero_api_url: "http://127.0.0.1:9/payments".to_string(),
        payhero_callback_token: Some(CALLBACK_TOKEN.to_string()),
        sms: None,
        whatsapp: None,
        paybill_number: "4150219".to_string(),
        reminder_window_days: (1, 5),
    }
}

pub fn setup() -> TestEnv {
    setup_with(test_config())
}

pub fn setup_with(mut config: Config) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("billing.db");
    config.database_path = path.to_string_lossy().into_owned();

    let pool = create_pool(&config.database_path, config.db_pool_size).unwrap();
    init_db(&pool.get().unwrap()).unwrap();

    let devices = Arc::new(RecordingChannel::new());
    let state = AppState::new(&config, pool, devices.clone());

    TestEnv {
        _dir: dir,
        state,
        devices,
    }
}

pub fn nairobi(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
    Nairobi.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn create_test_router(conn: &Connection) -> RouterCredential {
    queries::create_router(
        conn,
        &CreateRouter {
            ip_address: "10.0.0.1".to_string(),
            username: "admin".to_string(),
            router_secret: "router-pass".to_string(),
            port: 22,
        },
    )
    .unwrap()
}

pub fn create_test_subscriber(
    conn: &Connection,
    router_id: i64,
    secret: &str,
    end_date: i64,
) -> Subscriber {
    queries::create_subscriber(
        conn,
        &CreateSubscriber {
            company_id: Some(1),
            company_username: "fastnet".to_string(),
            router_id: Some(router_id),
            plan_id: Some(3),
            plan_name: Some("10Mbps".to_string()),
            plan_fee: 2500,
            installation_fee: 1000,
            full_name: "Jane Wanjiru".to_string(),
            phone_number: "0712345678".to_string(),
            secret: secret.to_string(),
            end_date,
            active: true,
        },
    )
    .unwrap()
}

pub fn create_test_payment(
    conn: &Connection,
    checkout_request_id: &str,
    receipt: &str,
) -> PaymentRecord {
    queries::create_payment_record(
        conn,
        &CreatePaymentRecord {
            checkout_request_id: checkout_request_id.to_string(),
            receipt_number: receipt.to_string(),
            amount: 2500,
            phone_number: Some("254712345678".to_string()),
        },
    )
    .unwrap()
    .expect("payment should be new")
}

/// Send a request through the app and decode the JSON reply.
pub async fn send_json(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response should be JSON")
    };
    (status, json)
}
