use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActorType {
    /// Automated pipeline or scheduled job
    System,
    /// Back-office staff via the API
    Operator,
    /// The subscriber, e.g. through a payment
    Customer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: String,
    pub timestamp: i64,
    pub actor_type: ActorType,
    pub action: String,
    pub subscriber_id: Option<i64>,
    pub router_id: Option<i64>,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub subscriber_id: Option<i64>,
    pub router_id: Option<i64>,
    pub limit: Option<i64>,
}
