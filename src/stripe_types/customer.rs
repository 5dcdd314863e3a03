use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::StripeObject;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Present and `true` for deleted customers.
    #[serde(default)]
    pub deleted: bool,
}

impl StripeObject for Customer {
    fn id(&self) -> &str {
        &self.id
    }
}
