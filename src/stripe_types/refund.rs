use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Refund {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    pub charge: Option<String>,
    pub reason: Option<String>,
    pub status: Option<String>,
}

/// Stripe Radar early fraud warning.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EarlyFraudWarning {
    pub id: String,
    pub charge: Option<String>,
    pub fraud_type: Option<String>,
}
