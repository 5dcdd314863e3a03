use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription allocation bookkeeping stored in `usage.balance_jsonb`.
///
/// Serialized as `{"kind": "none" | "monthly" | "yearly", ...}`. Monthly and yearly
/// allocations are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AllocationState {
    #[default]
    None,
    Monthly(MonthlyAllocation),
    Yearly(YearlyAllocation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyAllocation {
    pub monthly_credits: i32,
    pub related_order_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyAllocation {
    pub remaining_months: i32,
    pub next_credit_date: NaiveDate,
    pub monthly_credits: i32,
    /// `YYYY-MM` of the most recent month credited.
    pub last_allocated_month: String,
    pub related_order_id: Option<Uuid>,
}

impl AllocationState {
    pub fn is_none(&self) -> bool {
        matches!(self, AllocationState::None)
    }

    pub fn monthly_credits(&self) -> i32 {
        match self {
            AllocationState::None => 0,
            AllocationState::Monthly(m) => m.monthly_credits,
            AllocationState::Yearly(y) => y.monthly_credits,
        }
    }
}

/// Per-user balance snapshot; exactly one row per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub user_id: Uuid,
    pub subscription_credits_balance: i32,
    pub one_time_credits_balance: i32,
    #[sqlx(json)]
    pub allocation: AllocationState,
}

impl Usage {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            subscription_credits_balance: 0,
            one_time_credits_balance: 0,
            allocation: AllocationState::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn allocation_state_uses_kind_tag() {
        let yearly = AllocationState::Yearly(YearlyAllocation {
            remaining_months: 11,
            next_credit_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            monthly_credits: 100,
            last_allocated_month: "2026-01".to_string(),
            related_order_id: None,
        });
        assert_eq!(
            serde_json::to_value(&yearly).unwrap(),
            json!({
                "kind": "yearly",
                "remainingMonths": 11,
                "nextCreditDate": "2026-02-01",
                "monthlyCredits": 100,
                "lastAllocatedMonth": "2026-01",
                "relatedOrderId": null
            })
        );
        let none: AllocationState = serde_json::from_value(json!({"kind": "none"})).unwrap();
        assert!(none.is_none());
    }
}
