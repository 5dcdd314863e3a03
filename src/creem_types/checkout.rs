use serde::{Deserialize, Serialize};

use super::{
    metadata_str, CreemCustomer, CreemObject, CreemProduct, CreemRef, CreemSubscription, Metadata,
    ORDER_TYPE_ONETIME, ORDER_TYPE_RECURRING,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreemCheckout {
    pub id: String,
    /// `pending`, `processing`, `completed` or `expired`.
    pub status: String,
    pub request_id: Option<String>,
    pub order: Option<CreemOrder>,
    pub product: Option<CreemRef<CreemProduct>>,
    pub customer: Option<CreemRef<CreemCustomer>>,
    pub subscription: Option<CreemRef<CreemSubscription>>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreemOrder {
    pub id: String,
    pub customer: Option<String>,
    pub product: Option<String>,
    #[serde(default)]
    pub amount: i64,
    pub currency: String,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub order_type: String,
    pub sub_total: Option<i64>,
    pub discount_amount: Option<i64>,
    pub tax_amount: Option<i64>,
    pub amount_due: Option<i64>,
    pub amount_paid: Option<i64>,
    pub transaction: Option<String>,
}

impl CreemObject for CreemCheckout {
    fn id(&self) -> &str {
        &self.id
    }
}

impl CreemOrder {
    pub fn is_onetime(&self) -> bool {
        self.order_type == ORDER_TYPE_ONETIME
    }

    pub fn is_recurring(&self) -> bool {
        self.order_type == ORDER_TYPE_RECURRING
    }
}

impl CreemCheckout {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        metadata_str(&self.metadata, key)
    }

    pub fn product_id(&self) -> Option<&str> {
        self.product.as_ref().map(|p| p.id())
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(|c| c.id())
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checkout_accepts_inline_and_id_references() {
        let checkout: CreemCheckout = serde_json::from_value(json!({
            "id": "ch_1",
            "status": "completed",
            "product": {"id": "prod_1", "price": 900, "billing_type": "onetime"},
            "customer": "cust_1",
            "order": {"id": "ord_1", "currency": "USD", "type": "onetime", "amount_paid": 900},
            "metadata": {"userId": "u1", "planId": 7}
        }))
        .unwrap();

        assert_eq!(checkout.product_id(), Some("prod_1"));
        assert_eq!(checkout.customer_id(), Some("cust_1"));
        assert!(checkout.order.as_ref().unwrap().is_onetime());
        assert_eq!(checkout.metadata_value("userId"), Some("u1"));
        // Non-string metadata is ignored rather than coerced.
        assert_eq!(checkout.metadata_value("planId"), None);
    }
}
