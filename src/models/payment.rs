use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UsedStatus {
    Unused,
    Used,
}

/// A confirmed mobile-money payment, persisted by the gateway callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: i64,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "MpesaReceiptNumber")]
    pub receipt_number: String,
    pub amount: i64,
    pub phone_number: Option<String>,
    #[serde(rename = "usedStatus")]
    pub used_status: UsedStatus,
    pub company_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub router_id: Option<i64>,
    pub created_at: i64,
}

impl PaymentRecord {
    pub fn is_consumed(&self) -> bool {
        self.used_status == UsedStatus::Used
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRecord {
    pub checkout_request_id: String,
    pub receipt_number: String,
    pub amount: i64,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentType {
    /// First payment, includes the installation fee
    First,
    Repeat,
}

/// An outbound payment request (STK push) sent to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: i64,
    pub success: bool,
    pub status: Option<String>,
    pub reference: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: Option<String>,
    pub company_id: Option<i64>,
    pub company_username: String,
    pub router_id: Option<i64>,
    pub plan_id: Option<i64>,
    pub plan_name: Option<String>,
    pub phone_number: String,
    pub payment_type: PaymentType,
    pub installation_fee: i64,
    pub created_at: i64,
}

/// Per-company PayHero channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayHeroSettings {
    pub company_id: i64,
    pub channel_id: i64,
    #[serde(skip_serializing)]
    pub payhero_token: String,
    pub pppoe_callback_url: Option<String>,
}
