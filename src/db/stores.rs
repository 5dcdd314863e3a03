//! Storage seams used by the ledger services.
//!
//! Each trait has a Postgres implementation under `repositories` and an
//! in-memory implementation under `memory`.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::db::balance::{BalanceMutation, LedgerNote};
use crate::error::AppResult;
use crate::models::{
    CreditLog, CreditLogType, NewOrder, Order, OrderType, PaymentProvider, PricingPlan, RefundReference,
    SubscriptionRecord, SubscriptionUpsert, Usage,
};

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_provider_order_id(
        &self,
        provider: PaymentProvider,
        provider_order_id: &str,
    ) -> AppResult<Option<Order>>;

    /// Inserts a ledger row. A duplicate `(provider, provider_order_id)` fails
    /// with `AppError::AlreadyExists`.
    async fn insert(&self, order: NewOrder) -> AppResult<Order>;

    /// Most recent non-refund order matching the reference.
    async fn find_original_for_refund(
        &self,
        provider: PaymentProvider,
        reference: &RefundReference,
    ) -> AppResult<Option<Order>>;

    async fn update_status(&self, order_id: Uuid, status: &str) -> AppResult<()>;

    async fn find_for_user(
        &self,
        provider: PaymentProvider,
        provider_order_id: &str,
        user_id: Uuid,
        order_type: OrderType,
    ) -> AppResult<Option<Order>>;
}

#[async_trait]
pub trait CreditStore: Send + Sync {
    async fn get_usage(&self, user_id: Uuid) -> AppResult<Option<Usage>>;

    /// Applies one balance mutation atomically with its audit row.
    ///
    /// Returns `None` when the mutation had no effect and nothing was written.
    async fn apply(
        &self,
        user_id: Uuid,
        mutation: BalanceMutation,
        note: LedgerNote,
    ) -> AppResult<Option<CreditLog>>;

    /// Audit rows for a user in creation order.
    async fn list_logs(&self, user_id: Uuid) -> AppResult<Vec<CreditLog>>;

    /// Whether an audit row of `log_type` already references `order_id`.
    async fn has_log_for_order(&self, order_id: Uuid, log_type: CreditLogType) -> AppResult<bool>;

    /// Users whose yearly allocation has a month due on or before `today`.
    async fn users_with_due_yearly_allocation(&self, today: NaiveDate) -> AppResult<Vec<Uuid>>;
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn find_by_id(&self, plan_id: Uuid) -> AppResult<Option<PricingPlan>>;
    async fn find_by_stripe_price_id(&self, price_id: &str) -> AppResult<Option<PricingPlan>>;
    async fn find_by_creem_product_id(&self, product_id: &str) -> AppResult<Option<PricingPlan>>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn upsert(&self, upsert: SubscriptionUpsert) -> AppResult<SubscriptionRecord>;
    async fn find_by_subscription_id(&self, subscription_id: &str) -> AppResult<Option<SubscriptionRecord>>;
    async fn find_for_user(
        &self,
        subscription_id: &str,
        user_id: Uuid,
    ) -> AppResult<Option<SubscriptionRecord>>;
}

/// Read-only view of the user table owned by the identity service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user_id_by_stripe_customer(&self, customer_id: &str) -> AppResult<Option<Uuid>>;
    async fn find_email(&self, user_id: Uuid) -> AppResult<Option<String>>;
}
