use async_trait::async_trait;
use chrono::NaiveDate;
use log::info;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::db::balance::{BalanceMutation, LedgerNote, plan_change};
use crate::db::pool_ext::AcquireRetry;
use crate::db::stores::CreditStore;
use crate::error::{AppError, AppResult};
use crate::models::{CreditLog, CreditLogType, NewCreditLog, Usage};

const USAGE_COLUMNS: &str =
    "user_id, subscription_credits_balance, one_time_credits_balance, balance_jsonb AS allocation";

const CREDIT_LOG_COLUMNS: &str = r#"
    id, user_id, amount, balance_kind, one_time_balance_after, subscription_balance_after,
    type, notes, related_order_id, created_at
"#;

/// Usage balances and the credit audit log. Every balance change goes through
/// [`CreditStore::apply`], which holds the usage row lock for the whole
/// read-compute-write cycle.
#[derive(Debug, Clone)]
pub struct UsageRepository {
    pool: PgPool,
}

impl UsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_usage_with_executor(
        &self,
        user_id: Uuid,
        executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> AppResult<Option<Usage>> {
        let query = format!("SELECT {} FROM usage WHERE user_id = $1 FOR UPDATE", USAGE_COLUMNS);
        sqlx::query_as::<_, Usage>(&query)
            .bind(user_id)
            .fetch_optional(&mut **executor)
            .await
            .map_err(|e| AppError::Database(format!("Failed to lock usage for user {}: {}", user_id, e)))
    }

    async fn ensure_usage_row_with_executor(
        &self,
        user_id: Uuid,
        executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> AppResult<()> {
        sqlx::query("INSERT INTO usage (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut **executor)
            .await
            .map_err(|e| AppError::Database(format!("Failed to create usage row: {}", e)))?;
        Ok(())
    }

    async fn write_usage_with_executor(
        &self,
        usage: &Usage,
        executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE usage
            SET subscription_credits_balance = $2,
                one_time_credits_balance = $3,
                balance_jsonb = $4,
                updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(usage.user_id)
        .bind(usage.subscription_credits_balance)
        .bind(usage.one_time_credits_balance)
        .bind(Json(&usage.allocation))
        .execute(&mut **executor)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update usage: {}", e)))?;
        Ok(())
    }

    async fn log_exists_with_executor(
        &self,
        order_id: Uuid,
        log_type: CreditLogType,
        executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM credit_logs WHERE related_order_id = $1 AND type = $2)",
        )
        .bind(order_id)
        .bind(log_type)
        .fetch_one(&mut **executor)
        .await
        .map_err(|e| AppError::Database(format!("Failed to check credit logs for order {}: {}", order_id, e)))
    }

    pub async fn insert_log_with_executor(
        &self,
        log: &NewCreditLog,
        executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> AppResult<CreditLog> {
        let query = format!(
            r#"
            INSERT INTO credit_logs (
                id, user_id, amount, balance_kind, one_time_balance_after,
                subscription_balance_after, type, notes, related_order_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            CREDIT_LOG_COLUMNS
        );
        sqlx::query_as::<_, CreditLog>(&query)
            .bind(Uuid::new_v4())
            .bind(log.user_id)
            .bind(log.amount)
            .bind(log.balance_kind)
            .bind(log.one_time_balance_after)
            .bind(log.subscription_balance_after)
            .bind(log.log_type)
            .bind(&log.notes)
            .bind(log.related_order_id)
            .fetch_one(&mut **executor)
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert credit log: {}", e)))
    }
}

#[async_trait]
impl CreditStore for UsageRepository {
    async fn get_usage(&self, user_id: Uuid) -> AppResult<Option<Usage>> {
        let query = format!("SELECT {} FROM usage WHERE user_id = $1", USAGE_COLUMNS);
        sqlx::query_as::<_, Usage>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch usage: {}", e)))
    }

    async fn apply(
        &self,
        user_id: Uuid,
        mutation: BalanceMutation,
        note: LedgerNote,
    ) -> AppResult<Option<CreditLog>> {
        let mut tx = AcquireRetry::begin_with_retry(&self.pool, 3, 100)
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        if mutation.creates_row() {
            self.ensure_usage_row_with_executor(user_id, &mut tx).await?;
        }

        let current = self.lock_usage_with_executor(user_id, &mut tx).await?;
        if let Some(order_id) = note.guarded_order() {
            if self
                .log_exists_with_executor(order_id, mutation.log_type(), &mut tx)
                .await?
            {
                info!("{} for order {} already applied", mutation.log_type(), order_id);
                return Ok(None);
            }
        }
        let Some(change) = plan_change(user_id, current.as_ref(), &mutation, &note) else {
            // Dropping the transaction rolls it back and releases the lock
            return Ok(None);
        };

        self.write_usage_with_executor(&change.usage, &mut tx).await?;
        let log = match &change.log {
            Some(entry) => Some(self.insert_log_with_executor(entry, &mut tx).await?),
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit balance change: {}", e)))?;

        Ok(log)
    }

    async fn list_logs(&self, user_id: Uuid) -> AppResult<Vec<CreditLog>> {
        let query = format!(
            "SELECT {} FROM credit_logs WHERE user_id = $1 ORDER BY created_at ASC, id ASC",
            CREDIT_LOG_COLUMNS
        );
        sqlx::query_as::<_, CreditLog>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list credit logs: {}", e)))
    }

    async fn has_log_for_order(&self, order_id: Uuid, log_type: CreditLogType) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM credit_logs WHERE related_order_id = $1 AND type = $2)",
        )
        .bind(order_id)
        .bind(log_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to check credit logs for order {}: {}", order_id, e)))
    }

    async fn users_with_due_yearly_allocation(&self, today: NaiveDate) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT user_id FROM usage
            WHERE balance_jsonb->>'kind' = 'yearly'
              AND (balance_jsonb->>'remainingMonths')::int > 0
              AND (balance_jsonb->>'nextCreditDate')::date <= $1
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to find due yearly allocations: {}", e)))?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
