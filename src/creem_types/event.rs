use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.completed";
pub const EVENT_SUBSCRIPTION_ACTIVE: &str = "subscription.active";
pub const EVENT_SUBSCRIPTION_PAID: &str = "subscription.paid";
pub const EVENT_SUBSCRIPTION_UPDATE: &str = "subscription.update";
pub const EVENT_SUBSCRIPTION_CANCELED: &str = "subscription.canceled";
pub const EVENT_SUBSCRIPTION_EXPIRED: &str = "subscription.expired";
pub const EVENT_SUBSCRIPTION_TRIALING: &str = "subscription.trialing";
pub const EVENT_SUBSCRIPTION_PAUSED: &str = "subscription.paused";
pub const EVENT_REFUND_CREATED: &str = "refund.created";

pub const ORDER_TYPE_ONETIME: &str = "onetime";
pub const ORDER_TYPE_RECURRING: &str = "recurring";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreemEvent {
    pub id: String,
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(default)]
    pub created_at: i64,
    pub object: serde_json::Value,
}

impl CreemEvent {
    pub fn object<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_value(self.object.clone()).map_err(|e| {
            AppError::BadRequest(format!(
                "Malformed {} payload in Creem event {}: {}",
                self.event_type, self.id, e
            ))
        })
    }
}
