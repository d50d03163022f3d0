use serde::{Deserialize, Serialize};

/// A PPPoE account. `secret` is the session name configured on the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: i64,
    pub company_id: Option<i64>,
    pub company_username: String,
    pub router_id: Option<i64>,
    pub plan_id: Option<i64>,
    pub plan_name: Option<String>,
    pub plan_fee: i64,
    /// One-time fee, zeroed by the first confirmed payment
    pub installation_fee: i64,
    pub full_name: String,
    pub phone_number: String,
    pub secret: String,
    /// Service validity (Unix timestamp)
    pub end_date: i64,
    pub active: bool,
    pub reminder: bool,
}

impl Subscriber {
    /// Amount the subscriber owes on their next payment.
    pub fn amount_due(&self) -> i64 {
        self.plan_fee + self.installation_fee
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriber {
    pub company_id: Option<i64>,
    pub company_username: String,
    pub router_id: Option<i64>,
    #[serde(default)]
    pub plan_id: Option<i64>,
    #[serde(default)]
    pub plan_name: Option<String>,
    pub plan_fee: i64,
    #[serde(default)]
    pub installation_fee: i64,
    pub full_name: String,
    pub phone_number: String,
    pub secret: String,
    pub end_date: i64,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Minimal contact info used by the expiry sweep when the caller supplies
/// the list of disconnected subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiredSubscriber {
    pub id: i64,
    pub company_username: String,
    pub phone_number: String,
    pub plan_fee: i64,
}

impl From<&Subscriber> for ExpiredSubscriber {
    fn from(s: &Subscriber) -> Self {
        Self {
            id: s.id,
            company_username: s.company_username.clone(),
            phone_number: s.phone_number.clone(),
            plan_fee: s.plan_fee,
        }
    }
}
