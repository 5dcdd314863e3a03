use serde::{Deserialize, Serialize};

use super::CreemObject;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreemProduct {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub price: i64,
    pub currency: Option<String>,
    /// `recurring` or `onetime`.
    pub billing_type: Option<String>,
    /// `once`, `every-month`, `every-year`.
    pub billing_period: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreemCustomer {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreemDiscount {
    pub id: String,
    pub status: String,
    pub name: Option<String>,
    pub code: String,
    #[serde(rename = "type")]
    pub discount_type: String,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub percentage: Option<f64>,
    pub expiry_date: Option<String>,
    pub max_redemptions: Option<i64>,
    pub duration: Option<String>,
    pub duration_in_months: Option<i64>,
    #[serde(default)]
    pub applies_to_products: Vec<String>,
    pub redeem_count: Option<i64>,
}

impl CreemObject for CreemProduct {
    fn id(&self) -> &str {
        &self.id
    }
}

impl CreemObject for CreemCustomer {
    fn id(&self) -> &str {
        &self.id
    }
}
