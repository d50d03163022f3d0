//! Customer messaging for renewal reminders and disconnection notices.
//!
//! Supports two gateways:
//! 1. SMS via Africa's Talking
//! 2. WhatsApp via APIWAP
//!
//! Sends are fire-and-forget per recipient: one failure never stops the
//! batch, it is just counted in the report.

use chrono_tz::Tz;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::config::{SmsConfig, WhatsAppConfig};
use crate::error::{AppError, Result};
use crate::models::{ExpiredSubscriber, Subscriber};
use crate::util::friendly_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageChannel {
    Sms,
    Whatsapp,
}

/// Normalize a stored phone number for SMS delivery.
///
/// Drops anything after the first `/` or whitespace (some records hold two
/// numbers) and rewrites local `07XXXXXXXX` numbers to `+2547XXXXXXXX`.
pub fn normalize_sms_phone(raw: &str) -> String {
    let first = raw
        .split(|c: char| c == '/' || c.is_whitespace())
        .find(|part| !part.is_empty())
        .unwrap_or("")
        .trim();
    to_international(first)
}

/// Like [`normalize_sms_phone`], but also collapses a doubled leading zero
/// (`0079...` → `079...`), which the WhatsApp gateway rejects.
pub fn normalize_whatsapp_phone(raw: &str) -> String {
    let first = raw
        .split(|c: char| c == '/' || c.is_whitespace())
        .find(|part| !part.is_empty())
        .unwrap_or("")
        .trim();
    let single_zero = first.strip_prefix('0').filter(|rest| rest.starts_with('0')).unwrap_or(first);
    to_international(single_zero)
}

fn to_international(phone: &str) -> String {
    match phone.strip_prefix('0') {
        Some(rest) if phone.len() == 10 => format!("+254{}", rest),
        _ => phone.to_string(),
    }
}

pub fn reminder_message(
    company_username: &str,
    friendly_end_date: &str,
    plan_fee: i64,
    account: i64,
    paybill: &str,
) -> String {
    format!(
        "Hello {} client,\n\nYour home fiber subscription expires on {}.\n\nTo avoid disruption, kindly renew your subscription by paying {} to Paybill No. {} and Account No. {}. Make sure you enter the CORRECT ACCOUNT NUMBER.",
        company_username, friendly_end_date, plan_fee, paybill, account
    )
}

pub fn disconnection_message(company_username: &str, plan_fee: i64, account: i64, paybill: &str) -> String {
    format!(
        "Hello {} client,\n\nYour home fiber subscription has been temporarily disconnected due to non-payment.\n\nTo restore your service, please renew your subscription by paying {} to Paybill No. {} and Account No. {}. Make sure you enter the CORRECT ACCOUNT NUMBER.",
        company_username, plan_fee, paybill, account
    )
}

/// Africa's Talking bulk SMS request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SmsRequest<'a> {
    username: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender_id: Option<&'a str>,
    phone_numbers: Vec<&'a str>,
}

/// APIWAP send-message request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WhatsAppRequest<'a> {
    phone_number: &'a str,
    message: &'a str,
    #[serde(rename = "type")]
    message_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDetail {
    pub client_id: i64,
    pub phone: String,
    pub username: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryError {
    pub client_id: i64,
    pub phone: String,
    pub username: String,
    pub error: String,
}

/// Outcome of a batch send.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<DeliveryError>,
    pub details: Vec<DeliveryDetail>,
}

impl DeliveryReport {
    fn record(&mut self, client_id: i64, phone: String, username: &str, result: Result<serde_json::Value>) {
        match result {
            Ok(response) => {
                self.successful += 1;
                self.details.push(DeliveryDetail {
                    client_id,
                    phone,
                    username: username.to_string(),
                    status: DeliveryStatus::Success,
                    response: Some(response),
                    error: None,
                });
            }
            Err(e) => {
                self.failed += 1;
                let error = e.to_string();
                self.errors.push(DeliveryError {
                    client_id,
                    phone: phone.clone(),
                    username: username.to_string(),
                    error: error.clone(),
                });
                self.details.push(DeliveryDetail {
                    client_id,
                    phone,
                    username: username.to_string(),
                    status: DeliveryStatus::Failed,
                    response: None,
                    error: Some(error),
                });
            }
        }
    }
}

#[derive(Clone)]
pub struct MessagingService {
    http_client: Client,
    sms: Option<SmsConfig>,
    whatsapp: Option<WhatsAppConfig>,
    paybill_number: String,
    tz: Tz,
}

impl MessagingService {
    pub fn new(
        sms: Option<SmsConfig>,
        whatsapp: Option<WhatsAppConfig>,
        paybill_number: String,
        tz: Tz,
    ) -> Self {
        Self {
            http_client: Client::new(),
            sms,
            whatsapp,
            paybill_number,
            tz,
        }
    }

    pub async fn send_sms(&self, phone: &str, message: &str) -> Result<serde_json::Value> {
        let config = self
            .sms
            .as_ref()
            .ok_or_else(|| AppError::Gateway("SMS gateway not configured".into()))?;

        let request = SmsRequest {
            username: &config.username,
            message,
            sender_id: config.sender_id.as_deref(),
            phone_numbers: vec![phone],
        };

        let response = self
            .http_client
            .post(&config.url)
            .header("Accept", "application/json")
            .header("apiKey", &config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("SMS gateway error: {}", e)))?;

        parse_gateway_response(response, "SMS").await
    }

    pub async fn send_whatsapp(&self, phone: &str, message: &str) -> Result<serde_json::Value> {
        let config = self
            .whatsapp
            .as_ref()
            .ok_or_else(|| AppError::Gateway("WhatsApp gateway not configured".into()))?;

        let request = WhatsAppRequest {
            phone_number: phone,
            message,
            message_type: "text",
        };

        let response = self
            .http_client
            .post(&config.url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("WhatsApp gateway error: {}", e)))?;

        parse_gateway_response(response, "WhatsApp").await
    }

    /// Remind subscribers that their service is about to lapse.
    pub async fn send_reminders(&self, channel: MessageChannel, subscribers: &[Subscriber]) -> DeliveryReport {
        let mut report = DeliveryReport {
            total: subscribers.len(),
            ..Default::default()
        };

        for subscriber in subscribers {
            let message = reminder_message(
                &subscriber.company_username,
                &friendly_date(subscriber.end_date, self.tz),
                subscriber.plan_fee,
                subscriber.id,
                &self.paybill_number,
            );
            let (phone, result) = match channel {
                MessageChannel::Sms => {
                    let phone = normalize_sms_phone(&subscriber.phone_number);
                    let result = self.send_sms(&phone, &message).await;
                    (phone, result)
                }
                MessageChannel::Whatsapp => {
                    let phone = normalize_whatsapp_phone(&subscriber.phone_number);
                    let result = self.send_whatsapp(&phone, &message).await;
                    (phone, result)
                }
            };
            log_delivery(channel, subscriber.id, &phone, &result);
            report.record(subscriber.id, phone, &subscriber.company_username, result);
        }

        tracing::info!(
            channel = channel.as_ref(),
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            "Reminder batch processed"
        );
        report
    }

    /// Tell subscribers their session was disabled for non-payment.
    pub async fn send_disconnection_notices(&self, subscribers: &[ExpiredSubscriber]) -> DeliveryReport {
        let mut report = DeliveryReport {
            total: subscribers.len(),
            ..Default::default()
        };

        for subscriber in subscribers {
            let message = disconnection_message(
                &subscriber.company_username,
                subscriber.plan_fee,
                subscriber.id,
                &self.paybill_number,
            );
            let phone = normalize_sms_phone(&subscriber.phone_number);
            let result = self.send_sms(&phone, &message).await;
            log_delivery(MessageChannel::Sms, subscriber.id, &phone, &result);
            report.record(subscriber.id, phone, &subscriber.company_username, result);
        }

        tracing::info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            "Disconnection notices processed"
        );
        report
    }
}

fn log_delivery(channel: MessageChannel, subscriber_id: i64, phone: &str, result: &Result<serde_json::Value>) {
    match result {
        Ok(_) => tracing::debug!(channel = channel.as_ref(), subscriber_id, phone, "Message sent"),
        Err(e) => tracing::warn!(channel = channel.as_ref(), subscriber_id, phone, error = %e, "Message failed"),
    }
}

async fn parse_gateway_response(response: reqwest::Response, gateway: &str) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::Gateway(format!("{} gateway returned {}: {}", gateway, status, body)));
    }
    // Some gateways answer with an empty or non-JSON body on success
    let body = response.text().await.unwrap_or_default();
    Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
}
