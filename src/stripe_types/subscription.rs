use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Customer, Expandable, List, Price, StripeObject};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub customer: Expandable<Customer>,
    pub status: String,
    #[serde(default)]
    pub items: List<SubscriptionItem>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub trial_start: Option<i64>,
    pub trial_end: Option<i64>,
    // Older API versions keep the period on the subscription itself.
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SubscriptionItem {
    pub id: String,
    pub price: Option<Price>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

impl StripeObject for Subscription {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Subscription {
    fn first_item(&self) -> Option<&SubscriptionItem> {
        self.items.data.first()
    }

    pub fn price(&self) -> Option<&Price> {
        self.first_item().and_then(|item| item.price.as_ref())
    }

    pub fn price_id(&self) -> Option<&str> {
        self.price().map(|p| p.id.as_str())
    }

    pub fn product_id(&self) -> Option<&str> {
        self.price().and_then(|p| p.product.as_ref()).map(|p| p.id())
    }

    pub fn period_start(&self) -> Option<i64> {
        self.first_item()
            .and_then(|item| item.current_period_start)
            .or(self.current_period_start)
    }

    pub fn period_end(&self) -> Option<i64> {
        self.first_item()
            .and_then(|item| item.current_period_end)
            .or(self.current_period_end)
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn period_prefers_item_fields() {
        let subscription: Subscription = serde_json::from_value(json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "current_period_start": 1,
            "current_period_end": 2,
            "items": {"data": [{
                "id": "si_1",
                "price": {"id": "price_1", "product": "prod_1", "recurring": {"interval": "year"}},
                "current_period_start": 100,
                "current_period_end": 200
            }]}
        }))
        .unwrap();

        assert_eq!(subscription.period_start(), Some(100));
        assert_eq!(subscription.period_end(), Some(200));
        assert_eq!(subscription.price_id(), Some("price_1"));
        assert_eq!(subscription.product_id(), Some("prod_1"));
    }
}
