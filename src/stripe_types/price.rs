use serde::{Deserialize, Serialize};

use super::{Expandable, StripeObject};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Price {
    pub id: String,
    pub product: Option<Expandable<Product>>,
    pub unit_amount: Option<i64>,
    pub currency: Option<String>,
    pub recurring: Option<PriceRecurring>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PriceRecurring {
    pub interval: String,
    #[serde(default = "default_interval_count")]
    pub interval_count: i64,
}

fn default_interval_count() -> i64 {
    1
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Product {
    pub id: String,
    pub name: Option<String>,
}

impl StripeObject for Price {
    fn id(&self) -> &str {
        &self.id
    }
}

impl StripeObject for Product {
    fn id(&self) -> &str {
        &self.id
    }
}
