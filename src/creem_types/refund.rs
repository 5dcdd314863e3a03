use serde::{Deserialize, Serialize};

use super::{CreemCheckout, CreemCustomer, CreemOrder, CreemRef, CreemSubscription, CreemTransaction};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreemRefund {
    pub id: String,
    pub status: String,
    /// Minor units; may be reported negative.
    pub refund_amount: i64,
    pub refund_currency: Option<String>,
    pub reason: Option<String>,
    pub transaction: Option<CreemTransaction>,
    pub subscription: Option<CreemRef<CreemSubscription>>,
    pub checkout: Option<CreemRef<CreemCheckout>>,
    pub order: CreemOrder,
    pub customer: Option<CreemRef<CreemCustomer>>,
}

impl CreemRefund {
    pub fn refunded_minor_units(&self) -> i64 {
        self.refund_amount.abs()
    }

    /// Amount paid on the refunded transaction, falling back to the order.
    pub fn paid_minor_units(&self) -> i64 {
        self.transaction
            .as_ref()
            .map(|t| t.amount_paid)
            .or(self.order.amount_paid)
            .unwrap_or(self.order.amount)
    }

    pub fn checkout_metadata(&self) -> Option<&super::Metadata> {
        self.checkout
            .as_ref()
            .and_then(|c| c.as_object())
            .map(|c| &c.metadata)
    }
}
