use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::stores::PlanStore;
use crate::error::{AppError, AppResult};
use crate::models::PricingPlan;

const PLAN_COLUMNS: &str = r#"
    id, card_title, stripe_price_id, stripe_product_id, creem_product_id, payment_type,
    recurring_interval, price, currency, benefits_jsonb, is_active
"#;

/// Read-only access to the pricing plans maintained by the admin dashboard.
#[derive(Debug, Clone)]
pub struct PricingPlanRepository {
    pool: PgPool,
}

impl PricingPlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> AppResult<Option<PricingPlan>> {
        let query = format!("SELECT {} FROM pricing_plans WHERE {} = $1 LIMIT 1", PLAN_COLUMNS, column);
        sqlx::query_as::<_, PricingPlan>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch pricing plan by {}: {}", column, e)))
    }
}

#[async_trait]
impl PlanStore for PricingPlanRepository {
    async fn find_by_id(&self, plan_id: Uuid) -> AppResult<Option<PricingPlan>> {
        let query = format!("SELECT {} FROM pricing_plans WHERE id = $1", PLAN_COLUMNS);
        sqlx::query_as::<_, PricingPlan>(&query)
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch pricing plan {}: {}", plan_id, e)))
    }

    async fn find_by_stripe_price_id(&self, price_id: &str) -> AppResult<Option<PricingPlan>> {
        self.find_one("stripe_price_id", price_id).await
    }

    async fn find_by_creem_product_id(&self, product_id: &str) -> AppResult<Option<PricingPlan>> {
        self.find_one("creem_product_id", product_id).await
    }
}
