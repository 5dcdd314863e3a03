use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{metadata_str, CreemCustomer, CreemObject, CreemProduct, CreemRef, Metadata};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreemSubscription {
    pub id: String,
    pub product: CreemRef<CreemProduct>,
    pub customer: CreemRef<CreemCustomer>,
    /// `active`, `canceled`, `unpaid`, `trialing`, `paused` or `scheduled_cancel`.
    pub status: String,
    pub canceled_at: Option<DateTime<Utc>>,
    pub last_transaction: Option<CreemTransaction>,
    pub last_transaction_id: Option<String>,
    pub current_period_start_date: Option<DateTime<Utc>>,
    pub current_period_end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<CreemSubscriptionItem>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreemSubscriptionItem {
    pub id: String,
    pub product_id: Option<String>,
    pub price_id: Option<String>,
    #[serde(default)]
    pub units: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreemTransaction {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub discount_amount: i64,
    #[serde(default)]
    pub tax_amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub refunded_amount: i64,
    pub order: Option<String>,
    pub subscription: Option<String>,
    pub customer: Option<String>,
    /// Millisecond timestamps.
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
}

impl CreemObject for CreemSubscription {
    fn id(&self) -> &str {
        &self.id
    }
}

impl CreemSubscription {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        metadata_str(&self.metadata, key)
    }

    pub fn product_id(&self) -> &str {
        self.product.id()
    }

    pub fn customer_id(&self) -> &str {
        self.customer.id()
    }

    /// `billing_type` of the inlined product; Creem always inlines it on webhooks.
    pub fn billing_type(&self) -> Option<&str> {
        self.product
            .as_object()
            .and_then(|p| p.billing_type.as_deref())
    }
}
