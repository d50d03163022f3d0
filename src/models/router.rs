use serde::{Deserialize, Serialize};

/// Connection details for a subscriber-facing router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterCredential {
    pub id: i64,
    pub ip_address: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub router_secret: String,
    pub port: u16,
    pub status: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateRouter {
    pub ip_address: String,
    pub username: String,
    pub router_secret: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_ssh_port() -> u16 {
    22
}
