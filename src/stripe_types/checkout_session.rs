use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{
    Customer, Expandable, PaymentIntent, StripeObject, Subscription,
    CHECKOUT_SESSION_MODE_SUBSCRIPTION, CHECKOUT_SESSION_STATUS_COMPLETE,
};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub customer: Option<Expandable<Customer>>,
    pub mode: String,
    pub payment_intent: Option<Expandable<PaymentIntent>>,
    pub subscription: Option<Expandable<Subscription>>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub currency: Option<String>,
    pub amount_subtotal: Option<i64>,
    pub amount_total: Option<i64>,
    pub total_details: Option<TotalDetails>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TotalDetails {
    pub amount_discount: Option<i64>,
    pub amount_tax: Option<i64>,
}

impl StripeObject for CheckoutSession {
    fn id(&self) -> &str {
        &self.id
    }
}

impl CheckoutSession {
    pub fn is_subscription(&self) -> bool {
        self.mode == CHECKOUT_SESSION_MODE_SUBSCRIPTION
    }

    pub fn is_complete(&self) -> bool {
        self.status.as_deref() == Some(CHECKOUT_SESSION_STATUS_COMPLETE)
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(|c| c.id())
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        self.payment_intent.as_ref().map(|pi| pi.id())
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.id())
    }

    pub fn amount_discount(&self) -> Option<i64> {
        self.total_details.as_ref().and_then(|t| t.amount_discount)
    }

    pub fn amount_tax(&self) -> Option<i64> {
        self.total_details.as_ref().and_then(|t| t.amount_tax)
    }
}
