use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Customer, Expandable, List, PaymentIntent, Refund, StripeObject};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Charge {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_refunded: i64,
    pub currency: String,
    pub customer: Option<Expandable<Customer>>,
    pub payment_intent: Option<Expandable<PaymentIntent>>,
    pub description: Option<String>,
    #[serde(default)]
    pub refunded: bool,
    pub refunds: Option<List<Refund>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StripeObject for Charge {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Charge {
    /// The most recent refund; Stripe lists a charge's refunds newest first.
    pub fn latest_refund(&self) -> Option<&Refund> {
        self.refunds.as_ref().and_then(|refunds| refunds.data.first())
    }

    pub fn refund_reason(&self) -> Option<&str> {
        self.latest_refund().and_then(|refund| refund.reason.as_deref())
    }
}
