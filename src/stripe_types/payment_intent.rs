use serde::{Deserialize, Serialize};

use super::StripeObject;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    pub currency: Option<String>,
    pub status: Option<String>,
}

impl StripeObject for PaymentIntent {
    fn id(&self) -> &str {
        &self.id
    }
}
