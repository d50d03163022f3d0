use std::env;
use std::time::Duration;

use chrono_tz::Tz;

const DEFAULT_PAYHERO_API_URL: &str = "https://backend.payhero.co.ke/api/v2/payments";
const DEFAULT_APIWAP_URL: &str = "https://api.apiwap.com/api/v1/whatsapp/send-message";

const MIN_POLL_INTERVAL_MS: u64 = 100;
const MAX_POLL_INTERVAL_MS: u64 = 60_000;
const MAX_WATCH_TIMEOUT_SECS: u64 = 3600;
const MAX_DEVICE_TIMEOUT_SECS: u64 = 300;

/// Bounds for a single payment watch session.
#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    /// Deadline for the whole session. The watcher gives up after this elapses.
    pub timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Africa's Talking bulk SMS credentials.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub url: String,
    pub username: String,
    pub sender_id: Option<String>,
    pub api_key: String,
}

/// APIWAP WhatsApp credentials.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub db_pool_size: u32,
    pub base_url: String,
    /// Timezone used for expiry arithmetic and customer-facing dates
    pub business_timezone: Tz,
    pub watch: WatchConfig,
    /// Upper bound on connecting to (and talking with) a router
    pub device_timeout: Duration,
    /// Enable/disable audit logging entirely
    pub audit_log_enabled: bool,
    pub payhero_api_url: String,
    /// Shared secret expected in the `token` query param of PayHero callbacks
    pub payhero_callback_token: Option<String>,
    pub sms: Option<SmsConfig>,
    pub whatsapp: Option<WhatsAppConfig>,
    pub paybill_number: String,
    /// Reminder window, in days from today (inclusive on both ends)
    pub reminder_window_days: (i64, i64),
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Like [`parse_env`], bounded to `[min, max]`.
fn parse_env_clamped<T: std::str::FromStr + Ord>(key: &str, default: T, min: T, max: T) -> T {
    parse_env(key, default).clamp(min, max)
}

fn parse_bool(value: &str) -> bool {
    value != "false" && value != "0"
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = parse_env("PORT", 3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let business_timezone = env::var("BUSINESS_TIMEZONE")
            .ok()
            .and_then(|tz| match tz.parse::<Tz>() {
                Ok(tz) => Some(tz),
                Err(e) => {
                    tracing::warn!(timezone = %tz, error = %e, "Unknown BUSINESS_TIMEZONE, using Africa/Nairobi");
                    None
                }
            })
            .unwrap_or(chrono_tz::Africa::Nairobi);

        let defaults = WatchConfig::default();
        let watch = WatchConfig {
            poll_interval: Duration::from_millis(parse_env_clamped(
                "WATCH_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
                MIN_POLL_INTERVAL_MS,
                MAX_POLL_INTERVAL_MS,
            )),
            timeout: Duration::from_secs(parse_env_clamped(
                "WATCH_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
                1,
                MAX_WATCH_TIMEOUT_SECS,
            )),
        };

        let sms = match (
            env::var("AFRICAS_TALKING_URL"),
            env::var("AFRICAS_TALKING_USERNAME"),
            env::var("AFRICAS_TALKING_API_KEY"),
        ) {
            (Ok(url), Ok(username), Ok(api_key)) => Some(SmsConfig {
                url,
                username,
                sender_id: env::var("AFRICAS_TALKING_SENDER_ID").ok(),
                api_key,
            }),
            _ => None,
        };

        let whatsapp = env::var("APIWAP_API_KEY").ok().map(|api_key| WhatsAppConfig {
            url: env::var("APIWAP_URL").unwrap_or_else(|_| DEFAULT_APIWAP_URL.to_string()),
            api_key,
        });

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "pppoe_billing.db".to_string()),
            db_pool_size: parse_env("DB_POOL_SIZE", 10),
            base_url,
            business_timezone,
            watch,
            device_timeout: Duration::from_secs(parse_env_clamped(
                "DEVICE_CONNECT_TIMEOUT_SECS",
                10,
                1,
                MAX_DEVICE_TIMEOUT_SECS,
            )),
            audit_log_enabled: env::var("AUDIT_LOG_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
            payhero_api_url: env::var("PAYHERO_API_URL")
                .unwrap_or_else(|_| DEFAULT_PAYHERO_API_URL.to_string()),
            payhero_callback_token: env::var("PAYHERO_CALLBACK_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            sms,
            whatsapp,
            paybill_number: env::var("PAYBILL_NUMBER").unwrap_or_else(|_| "4150219".to_string()),
            reminder_window_days: (
                parse_env("REMINDER_WINDOW_START_DAYS", 1),
                parse_env("REMINDER_WINDOW_END_DAYS", 5),
            ),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
