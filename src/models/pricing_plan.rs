use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PricingPlan {
    pub id: Uuid,
    pub card_title: String,
    pub stripe_price_id: Option<String>,
    pub stripe_product_id: Option<String>,
    pub creem_product_id: Option<String>,
    pub payment_type: Option<String>,
    pub recurring_interval: Option<String>,
    pub price: Option<BigDecimal>,
    pub currency: Option<String>,
    pub benefits_jsonb: Value,
    pub is_active: bool,
}

impl PricingPlan {
    pub fn benefits(&self) -> PlanBenefits {
        PlanBenefits::from_json(&self.benefits_jsonb)
    }

    pub fn interval(&self) -> Option<BillingInterval> {
        self.recurring_interval.as_deref().and_then(BillingInterval::parse)
    }
}

/// Credit benefits declared on a plan. Missing or non-positive values read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanBenefits {
    pub one_time_credits: i32,
    pub monthly_credits: i32,
    pub total_months: i32,
}

impl PlanBenefits {
    pub fn from_json(value: &Value) -> Self {
        let read = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
                .filter(|n| *n > 0)
                .map(|n| n.min(i32::MAX as i64) as i32)
                .unwrap_or(0)
        };

        Self {
            one_time_credits: read("oneTimeCredits"),
            monthly_credits: read("monthlyCredits"),
            total_months: read("totalMonths"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Monthly,
    Yearly,
}

impl BillingInterval {
    /// Accepts both Stripe (`month`/`year`) and Creem (`every-month`/`every-year`) spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "month" | "monthly" | "every-month" => Some(BillingInterval::Monthly),
            "year" | "yearly" | "every-year" => Some(BillingInterval::Yearly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Monthly => "monthly",
            BillingInterval::Yearly => "yearly",
        }
    }
}
