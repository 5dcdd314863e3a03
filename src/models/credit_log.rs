use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditLogType {
    OneTimePurchase,
    SubscriptionGrant,
    SubscriptionUpgrade,
    SubscriptionDowngrade,
    RefundRevoke,
    SubscriptionEndedRevoke,
}

impl CreditLogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditLogType::OneTimePurchase => "one_time_purchase",
            CreditLogType::SubscriptionGrant => "subscription_grant",
            CreditLogType::SubscriptionUpgrade => "subscription_upgrade",
            CreditLogType::SubscriptionDowngrade => "subscription_downgrade",
            CreditLogType::RefundRevoke => "refund_revoke",
            CreditLogType::SubscriptionEndedRevoke => "subscription_ended_revoke",
        }
    }
}

impl fmt::Display for CreditLogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditLogType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_time_purchase" => Ok(CreditLogType::OneTimePurchase),
            "subscription_grant" => Ok(CreditLogType::SubscriptionGrant),
            "subscription_upgrade" => Ok(CreditLogType::SubscriptionUpgrade),
            "subscription_downgrade" => Ok(CreditLogType::SubscriptionDowngrade),
            "refund_revoke" => Ok(CreditLogType::RefundRevoke),
            "subscription_ended_revoke" => Ok(CreditLogType::SubscriptionEndedRevoke),
            other => Err(AppError::InvalidArgument(format!("Unknown credit log type: {}", other))),
        }
    }
}

/// Which of the two usage counters a log row changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceKind {
    OneTime,
    Subscription,
}

impl BalanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceKind::OneTime => "one_time",
            BalanceKind::Subscription => "subscription",
        }
    }
}

impl FromStr for BalanceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_time" => Ok(BalanceKind::OneTime),
            "subscription" => Ok(BalanceKind::Subscription),
            other => Err(AppError::InvalidArgument(format!("Unknown balance kind: {}", other))),
        }
    }
}

super::impl_text_column!(CreditLogType);
super::impl_text_column!(BalanceKind);

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CreditLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i32,
    pub balance_kind: BalanceKind,
    pub one_time_balance_after: i32,
    pub subscription_balance_after: i32,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub log_type: CreditLogType,
    pub notes: Option<String>,
    pub related_order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCreditLog {
    pub user_id: Uuid,
    pub amount: i32,
    pub balance_kind: BalanceKind,
    pub one_time_balance_after: i32,
    pub subscription_balance_after: i32,
    pub log_type: CreditLogType,
    pub notes: Option<String>,
    pub related_order_id: Option<Uuid>,
}

impl NewCreditLog {
    pub fn into_log(self, id: Uuid, created_at: DateTime<Utc>) -> CreditLog {
        CreditLog {
            id,
            user_id: self.user_id,
            amount: self.amount,
            balance_kind: self.balance_kind,
            one_time_balance_after: self.one_time_balance_after,
            subscription_balance_after: self.subscription_balance_after,
            log_type: self.log_type,
            notes: self.notes,
            related_order_id: self.related_order_id,
            created_at,
        }
    }
}
