use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::stores::SubscriptionStore;
use crate::error::{AppError, AppResult};
use crate::models::{SubscriptionRecord, SubscriptionUpsert};

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, user_id, plan_id, provider, subscription_id, customer_id, price_id, status,
    current_period_start, current_period_end, cancel_at_period_end, canceled_at, ended_at,
    trial_start, trial_end, metadata, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for SubscriptionRepository {
    async fn upsert(&self, upsert: SubscriptionUpsert) -> AppResult<SubscriptionRecord> {
        let query = format!(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan_id, provider, subscription_id, customer_id, price_id, status,
                current_period_start, current_period_end, cancel_at_period_end, canceled_at,
                ended_at, trial_start, trial_end, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (subscription_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                plan_id = EXCLUDED.plan_id,
                customer_id = EXCLUDED.customer_id,
                price_id = EXCLUDED.price_id,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                canceled_at = EXCLUDED.canceled_at,
                ended_at = EXCLUDED.ended_at,
                trial_start = EXCLUDED.trial_start,
                trial_end = EXCLUDED.trial_end,
                metadata = EXCLUDED.metadata,
                updated_at = now()
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        );

        sqlx::query_as::<_, SubscriptionRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(upsert.user_id)
            .bind(upsert.plan_id)
            .bind(upsert.provider)
            .bind(&upsert.subscription_id)
            .bind(&upsert.customer_id)
            .bind(&upsert.price_id)
            .bind(&upsert.status)
            .bind(upsert.current_period_start)
            .bind(upsert.current_period_end)
            .bind(upsert.cancel_at_period_end)
            .bind(upsert.canceled_at)
            .bind(upsert.ended_at)
            .bind(upsert.trial_start)
            .bind(upsert.trial_end)
            .bind(&upsert.metadata)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::Database(format!(
                    "Failed to upsert subscription {}: {}",
                    upsert.subscription_id, e
                ))
            })
    }

    async fn find_by_subscription_id(&self, subscription_id: &str) -> AppResult<Option<SubscriptionRecord>> {
        let query = format!(
            "SELECT {} FROM subscriptions WHERE subscription_id = $1",
            SUBSCRIPTION_COLUMNS
        );
        sqlx::query_as::<_, SubscriptionRecord>(&query)
            .bind(subscription_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch subscription: {}", e)))
    }

    async fn find_for_user(
        &self,
        subscription_id: &str,
        user_id: Uuid,
    ) -> AppResult<Option<SubscriptionRecord>> {
        let query = format!(
            "SELECT {} FROM subscriptions WHERE subscription_id = $1 AND user_id = $2",
            SUBSCRIPTION_COLUMNS
        );
        sqlx::query_as::<_, SubscriptionRecord>(&query)
            .bind(subscription_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch subscription for user: {}", e)))
    }
}
