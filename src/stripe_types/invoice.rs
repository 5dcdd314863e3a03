use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Customer, Expandable, List, PaymentIntent, StripeObject, Subscription};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Invoice {
    pub id: String,
    pub customer: Option<Expandable<Customer>>,
    /// Removed in newer API versions in favour of `parent.subscription_details`.
    pub subscription: Option<Expandable<Subscription>>,
    pub parent: Option<InvoiceParent>,
    pub status: Option<String>,
    pub billing_reason: Option<String>,
    pub currency: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    pub subtotal: Option<i64>,
    #[serde(default)]
    pub total_discount_amounts: Vec<InvoiceAmount>,
    #[serde(default)]
    pub total_taxes: Vec<InvoiceAmount>,
    pub payment_intent: Option<Expandable<PaymentIntent>>,
    pub payments: Option<List<InvoicePayment>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InvoiceParent {
    pub subscription_details: Option<SubscriptionDetails>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SubscriptionDetails {
    pub subscription: Option<Expandable<Subscription>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InvoiceAmount {
    #[serde(default)]
    pub amount: i64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InvoicePayment {
    pub payment: Option<InvoicePaymentDetails>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InvoicePaymentDetails {
    pub payment_intent: Option<Expandable<PaymentIntent>>,
}

impl StripeObject for Invoice {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Invoice {
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription
            .as_ref()
            .or_else(|| {
                self.parent
                    .as_ref()
                    .and_then(|p| p.subscription_details.as_ref())
                    .and_then(|d| d.subscription.as_ref())
            })
            .map(|s| s.id())
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(|c| c.id())
    }

    /// Payment intent from the invoice itself or its first payment, when present in the payload.
    pub fn payment_intent_id(&self) -> Option<&str> {
        self.payment_intent
            .as_ref()
            .map(|pi| pi.id())
            .or_else(|| {
                self.payments
                    .as_ref()
                    .and_then(|list| list.data.iter().find_map(|p| p.payment.as_ref()))
                    .and_then(|p| p.payment_intent.as_ref())
                    .map(|pi| pi.id())
            })
    }

    pub fn discount_total(&self) -> i64 {
        self.total_discount_amounts.iter().map(|a| a.amount).sum()
    }

    pub fn tax_total(&self) -> i64 {
        self.total_taxes.iter().map(|a| a.amount).sum()
    }

    /// Metadata on the invoice, falling back to the subscription details copy.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .or_else(|| {
                self.parent
                    .as_ref()
                    .and_then(|p| p.subscription_details.as_ref())
                    .and_then(|d| d.metadata.get(key))
            })
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}
