use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::stores::OrderStore;
use crate::error::{AppError, AppResult};
use crate::models::{NewOrder, Order, OrderType, PaymentProvider, RefundReference};

const ORDER_COLUMNS: &str = r#"
    id, user_id, provider, provider_order_id, order_type, status,
    stripe_payment_intent_id, stripe_invoice_id, stripe_charge_id, subscription_id,
    plan_id, product_id, price_id, amount_subtotal, amount_discount, amount_tax,
    amount_total, currency, metadata, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_with_executor(
        &self,
        order: &NewOrder,
        executor: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> AppResult<Order> {
        let query = format!(
            r#"
            INSERT INTO orders (
                id, user_id, provider, provider_order_id, order_type, status,
                stripe_payment_intent_id, stripe_invoice_id, stripe_charge_id, subscription_id,
                plan_id, product_id, price_id, amount_subtotal, amount_discount, amount_tax,
                amount_total, currency, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        sqlx::query_as::<_, Order>(&query)
            .bind(Uuid::new_v4())
            .bind(order.user_id)
            .bind(order.provider)
            .bind(&order.provider_order_id)
            .bind(order.order_type)
            .bind(&order.status)
            .bind(&order.stripe_payment_intent_id)
            .bind(&order.stripe_invoice_id)
            .bind(&order.stripe_charge_id)
            .bind(&order.subscription_id)
            .bind(order.plan_id)
            .bind(&order.product_id)
            .bind(&order.price_id)
            .bind(&order.amount_subtotal)
            .bind(&order.amount_discount)
            .bind(&order.amount_tax)
            .bind(&order.amount_total)
            .bind(&order.currency)
            .bind(&order.metadata)
            .fetch_one(&mut **executor)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::AlreadyExists(_) => AppError::AlreadyExists(format!(
                    "Order {} for provider {} already recorded",
                    order.provider_order_id, order.provider
                )),
                AppError::Database(msg) => AppError::Database(format!("Failed to insert order: {}", msg)),
                other => other,
            })
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn find_by_provider_order_id(
        &self,
        provider: PaymentProvider,
        provider_order_id: &str,
    ) -> AppResult<Option<Order>> {
        let query = format!(
            "SELECT {} FROM orders WHERE provider = $1 AND provider_order_id = $2",
            ORDER_COLUMNS
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(provider)
            .bind(provider_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch order: {}", e)))
    }

    async fn insert(&self, order: NewOrder) -> AppResult<Order> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;
        let inserted = self.insert_with_executor(&order, &mut tx).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit order insert: {}", e)))?;
        Ok(inserted)
    }

    async fn find_original_for_refund(
        &self,
        provider: PaymentProvider,
        reference: &RefundReference,
    ) -> AppResult<Option<Order>> {
        let column = match reference {
            RefundReference::PaymentIntent(_) => "stripe_payment_intent_id",
            RefundReference::ProviderOrder(_) => "provider_order_id",
        };
        let query = format!(
            r#"
            SELECT {} FROM orders
            WHERE provider = $1 AND {} = $2 AND order_type <> 'refund'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            ORDER_COLUMNS, column
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(provider)
            .bind(reference.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to find original order for refund: {}", e)))
    }

    async fn update_status(&self, order_id: Uuid, status: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = now() WHERE id = $1")
            .bind(order_id)
            .bind(status)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to update order status: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Order {} not found", order_id)));
        }
        Ok(())
    }

    async fn find_for_user(
        &self,
        provider: PaymentProvider,
        provider_order_id: &str,
        user_id: Uuid,
        order_type: OrderType,
    ) -> AppResult<Option<Order>> {
        let query = format!(
            r#"
            SELECT {} FROM orders
            WHERE provider = $1 AND provider_order_id = $2 AND user_id = $3 AND order_type = $4
            "#,
            ORDER_COLUMNS
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(provider)
            .bind(provider_order_id)
            .bind(user_id)
            .bind(order_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch order for user: {}", e)))
    }
}
