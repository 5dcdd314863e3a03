use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::PaymentProvider;

pub const SUBSCRIPTION_STATUS_ACTIVE: &str = "active";
pub const SUBSCRIPTION_STATUS_TRIALING: &str = "trialing";
pub const SUBSCRIPTION_STATUS_CANCELED: &str = "canceled";

/// Latest known provider state of one external subscription.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub provider: PaymentProvider,
    pub subscription_id: String,
    pub customer_id: String,
    pub price_id: Option<String>,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    pub fn is_active(&self) -> bool {
        self.status == SUBSCRIPTION_STATUS_ACTIVE || self.status == SUBSCRIPTION_STATUS_TRIALING
    }
}

/// Insert-or-update payload keyed by `subscription_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpsert {
    pub user_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub provider: PaymentProvider,
    pub subscription_id: String,
    pub customer_id: String,
    pub price_id: Option<String>,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub metadata: Value,
}

impl SubscriptionUpsert {
    /// Applies this upsert over an existing row, or creates a fresh one.
    pub fn merge_into(self, existing: Option<SubscriptionRecord>, now: DateTime<Utc>) -> SubscriptionRecord {
        let (id, created_at) = existing
            .map(|row| (row.id, row.created_at))
            .unwrap_or_else(|| (Uuid::new_v4(), now));

        SubscriptionRecord {
            id,
            user_id: self.user_id,
            plan_id: self.plan_id,
            provider: self.provider,
            subscription_id: self.subscription_id,
            customer_id: self.customer_id,
            price_id: self.price_id,
            status: self.status,
            current_period_start: self.current_period_start,
            current_period_end: self.current_period_end,
            cancel_at_period_end: self.cancel_at_period_end,
            canceled_at: self.canceled_at,
            ended_at: self.ended_at,
            trial_start: self.trial_start,
            trial_end: self.trial_end,
            metadata: self.metadata,
            created_at,
            updated_at: now,
        }
    }
}
