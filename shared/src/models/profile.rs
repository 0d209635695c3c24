//! Customer profile projections read by the orchestrator

use serde::{Deserialize, Serialize};

/// Channel opt-ins stored on the customer profile
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPreferences {
    pub email: bool,
    pub sms: bool,
    pub push: bool,
    /// Order and payment updates
    pub order_updates: bool,
    /// Loyalty points updates
    pub rewards: bool,
    /// Marketing messages (separate opt-in)
    pub promotions: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            sms: false,
            push: true,
            order_updates: true,
            rewards: true,
            promotions: false,
        }
    }
}

/// Contact endpoints for the channel transports
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
}
