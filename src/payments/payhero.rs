use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{CreatePaymentRecord, PayHeroSettings, Subscriber};

/// Body of an STK-push request.
#[derive(Debug, Serialize)]
pub struct InitiatePaymentRequest {
    pub amount: i64,
    pub phone_number: String,
    pub channel_id: i64,
    pub provider: &'static str,
    pub external_reference: String,
    pub customer_name: String,
    pub callback_url: String,
}

impl InitiatePaymentRequest {
    /// Charge the plan fee plus any outstanding installation fee.
    pub fn for_subscriber(
        subscriber: &Subscriber,
        settings: &PayHeroSettings,
        external_reference: String,
        callback_url: String,
    ) -> Self {
        Self {
            amount: subscriber.amount_due(),
            phone_number: subscriber.phone_number.clone(),
            channel_id: settings.channel_id,
            provider: "m-pesa",
            external_reference,
            customer_name: subscriber.full_name.clone(),
            callback_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatePaymentResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PayHeroClient {
    client: Client,
    api_url: String,
}

impl PayHeroClient {
    pub fn new(api_url: String) -> Self {
        Self {
            client: Client::new(),
            api_url,
        }
    }

    /// Send an STK push. The confirmation arrives later on the callback URL.
    pub async fn initiate_payment(
        &self,
        settings: &PayHeroSettings,
        request: &InitiatePaymentRequest,
    ) -> Result<InitiatePaymentResponse> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", &settings.payhero_token)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("PayHero API error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %error_text, "PayHero rejected payment request");
            return Err(AppError::Gateway(format!("PayHero API error: {}", error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse PayHero response: {}", e)))
    }
}

/// Callback PayHero posts once the customer completes (or abandons) the push.
#[derive(Debug, Deserialize)]
pub struct PayHeroCallback {
    #[serde(default)]
    pub status: bool,
    pub response: PayHeroCallbackResponse,
}

#[derive(Debug, Deserialize)]
pub struct PayHeroCallbackResponse {
    #[serde(rename = "Amount", default)]
    pub amount: f64,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ExternalReference", default)]
    pub external_reference: Option<String>,
    #[serde(rename = "MpesaReceiptNumber", default)]
    pub receipt_number: Option<String>,
    #[serde(rename = "Phone", default)]
    pub phone: Option<String>,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,
}

impl PayHeroCallback {
    /// The payment record to persist, if this callback reports a settled payment.
    pub fn settled_payment(&self) -> Option<CreatePaymentRecord> {
        let response = &self.response;
        if response.result_code != 0 {
            return None;
        }
        let receipt = response.receipt_number.as_deref()?.trim();
        if receipt.is_empty() {
            return None;
        }
        Some(CreatePaymentRecord {
            checkout_request_id: response.checkout_request_id.clone(),
            receipt_number: receipt.to_string(),
            amount: response.amount.round() as i64,
            phone_number: response.phone.clone(),
        })
    }
}
