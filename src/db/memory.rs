//! In-process stores with the same contracts as the Postgres repositories.
//!
//! A single mutex per store stands in for the row lock: every balance change
//! runs its read-compute-write cycle while holding it.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::db::balance::{BalanceMutation, LedgerNote, plan_change};
use crate::db::stores::{CreditStore, OrderStore, PlanStore, SubscriptionStore, UserDirectory};
use crate::error::{AppError, AppResult};
use crate::models::{
    AllocationState, CreditLog, CreditLogType, NewOrder, Order, OrderType, PaymentProvider, PricingPlan,
    RefundReference, SubscriptionRecord, SubscriptionUpsert, Usage,
};

fn poisoned<T>(_: T) -> AppError {
    AppError::Internal("In-memory store lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    orders: Mutex<Vec<Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Order> {
        self.orders.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_by_provider_order_id(
        &self,
        provider: PaymentProvider,
        provider_order_id: &str,
    ) -> AppResult<Option<Order>> {
        let orders = self.orders.lock().map_err(poisoned)?;
        Ok(orders
            .iter()
            .find(|o| o.provider == provider && o.provider_order_id == provider_order_id)
            .cloned())
    }

    async fn insert(&self, order: NewOrder) -> AppResult<Order> {
        let mut orders = self.orders.lock().map_err(poisoned)?;
        if orders
            .iter()
            .any(|o| o.provider == order.provider && o.provider_order_id == order.provider_order_id)
        {
            return Err(AppError::AlreadyExists(format!(
                "Order {} for provider {} already recorded",
                order.provider_order_id, order.provider
            )));
        }
        let stored = order.into_order(Uuid::new_v4(), Utc::now());
        orders.push(stored.clone());
        Ok(stored)
    }

    async fn find_original_for_refund(
        &self,
        provider: PaymentProvider,
        reference: &RefundReference,
    ) -> AppResult<Option<Order>> {
        let orders = self.orders.lock().map_err(poisoned)?;
        Ok(orders
            .iter()
            .rev()
            .filter(|o| o.provider == provider && !o.is_refund())
            .find(|o| match reference {
                RefundReference::PaymentIntent(pi) => o.stripe_payment_intent_id.as_deref() == Some(pi),
                RefundReference::ProviderOrder(id) => &o.provider_order_id == id,
            })
            .cloned())
    }

    async fn update_status(&self, order_id: Uuid, status: &str) -> AppResult<()> {
        let mut orders = self.orders.lock().map_err(poisoned)?;
        let order = orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
        order.status = status.to_string();
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn find_for_user(
        &self,
        provider: PaymentProvider,
        provider_order_id: &str,
        user_id: Uuid,
        order_type: OrderType,
    ) -> AppResult<Option<Order>> {
        let orders = self.orders.lock().map_err(poisoned)?;
        Ok(orders
            .iter()
            .find(|o| {
                o.provider == provider
                    && o.provider_order_id == provider_order_id
                    && o.user_id == user_id
                    && o.order_type == order_type
            })
            .cloned())
    }
}

#[derive(Debug, Default)]
struct CreditState {
    usage: HashMap<Uuid, Usage>,
    logs: Vec<CreditLog>,
}

#[derive(Debug, Default)]
pub struct MemoryCreditStore {
    state: Mutex<CreditState>,
}

impl MemoryCreditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a usage row directly, bypassing the audit log.
    pub fn seed_usage(&self, usage: Usage) {
        if let Ok(mut state) = self.state.lock() {
            state.usage.insert(usage.user_id, usage);
        }
    }
}

#[async_trait]
impl CreditStore for MemoryCreditStore {
    async fn get_usage(&self, user_id: Uuid) -> AppResult<Option<Usage>> {
        let state = self.state.lock().map_err(poisoned)?;
        Ok(state.usage.get(&user_id).cloned())
    }

    async fn apply(
        &self,
        user_id: Uuid,
        mutation: BalanceMutation,
        note: LedgerNote,
    ) -> AppResult<Option<CreditLog>> {
        let mut state = self.state.lock().map_err(poisoned)?;
        if let Some(order_id) = note.guarded_order() {
            let log_type = mutation.log_type();
            if state
                .logs
                .iter()
                .any(|l| l.related_order_id == Some(order_id) && l.log_type == log_type)
            {
                return Ok(None);
            }
        }
        let Some(change) = plan_change(user_id, state.usage.get(&user_id), &mutation, &note) else {
            return Ok(None);
        };

        state.usage.insert(user_id, change.usage);
        let log = change.log.map(|entry| entry.into_log(Uuid::new_v4(), Utc::now()));
        if let Some(log) = &log {
            state.logs.push(log.clone());
        }
        Ok(log)
    }

    async fn list_logs(&self, user_id: Uuid) -> AppResult<Vec<CreditLog>> {
        let state = self.state.lock().map_err(poisoned)?;
        Ok(state.logs.iter().filter(|l| l.user_id == user_id).cloned().collect())
    }

    async fn has_log_for_order(&self, order_id: Uuid, log_type: CreditLogType) -> AppResult<bool> {
        let state = self.state.lock().map_err(poisoned)?;
        Ok(state
            .logs
            .iter()
            .any(|l| l.related_order_id == Some(order_id) && l.log_type == log_type))
    }

    async fn users_with_due_yearly_allocation(&self, today: NaiveDate) -> AppResult<Vec<Uuid>> {
        let state = self.state.lock().map_err(poisoned)?;
        Ok(state
            .usage
            .values()
            .filter(|u| match &u.allocation {
                AllocationState::Yearly(y) => y.remaining_months > 0 && y.next_credit_date <= today,
                _ => false,
            })
            .map(|u| u.user_id)
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryPlanStore {
    plans: Mutex<Vec<PricingPlan>>,
}

impl MemoryPlanStore {
    pub fn new(plans: Vec<PricingPlan>) -> Self {
        Self {
            plans: Mutex::new(plans),
        }
    }

    fn find(&self, predicate: impl Fn(&PricingPlan) -> bool) -> AppResult<Option<PricingPlan>> {
        let plans = self.plans.lock().map_err(poisoned)?;
        Ok(plans.iter().find(|p| predicate(p)).cloned())
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn find_by_id(&self, plan_id: Uuid) -> AppResult<Option<PricingPlan>> {
        self.find(|p| p.id == plan_id)
    }

    async fn find_by_stripe_price_id(&self, price_id: &str) -> AppResult<Option<PricingPlan>> {
        self.find(|p| p.stripe_price_id.as_deref() == Some(price_id))
    }

    async fn find_by_creem_product_id(&self, product_id: &str) -> AppResult<Option<PricingPlan>> {
        self.find(|p| p.creem_product_id.as_deref() == Some(product_id))
    }
}

#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    rows: Mutex<HashMap<String, SubscriptionRecord>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn upsert(&self, upsert: SubscriptionUpsert) -> AppResult<SubscriptionRecord> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        let key = upsert.subscription_id.clone();
        let existing = rows.remove(&key);
        let record = upsert.merge_into(existing, Utc::now());
        rows.insert(key, record.clone());
        Ok(record)
    }

    async fn find_by_subscription_id(&self, subscription_id: &str) -> AppResult<Option<SubscriptionRecord>> {
        let rows = self.rows.lock().map_err(poisoned)?;
        Ok(rows.get(subscription_id).cloned())
    }

    async fn find_for_user(
        &self,
        subscription_id: &str,
        user_id: Uuid,
    ) -> AppResult<Option<SubscriptionRecord>> {
        let rows = self.rows.lock().map_err(poisoned)?;
        Ok(rows
            .get(subscription_id)
            .filter(|r| r.user_id == user_id)
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    customers: Mutex<HashMap<String, Uuid>>,
    emails: Mutex<HashMap<Uuid, String>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: Uuid, email: &str, stripe_customer_id: Option<&str>) {
        if let Ok(mut emails) = self.emails.lock() {
            emails.insert(user_id, email.to_string());
        }
        if let (Some(customer), Ok(mut customers)) = (stripe_customer_id, self.customers.lock()) {
            customers.insert(customer.to_string(), user_id);
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_user_id_by_stripe_customer(&self, customer_id: &str) -> AppResult<Option<Uuid>> {
        let customers = self.customers.lock().map_err(poisoned)?;
        Ok(customers.get(customer_id).copied())
    }

    async fn find_email(&self, user_id: Uuid) -> AppResult<Option<String>> {
        let emails = self.emails.lock().map_err(poisoned)?;
        Ok(emails.get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    #[tokio::test]
    async fn duplicate_order_insert_is_rejected() {
        let store = MemoryOrderStore::new();
        let order = NewOrder::new(
            Uuid::new_v4(),
            PaymentProvider::Stripe,
            "pi_123",
            OrderType::OneTimePurchase,
            BigDecimal::from(10),
            "usd",
        );
        store.insert(order.clone()).await.unwrap();
        let err = store.insert(order).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn guarded_grant_applies_once_per_order() {
        let store = MemoryCreditStore::new();
        let user_id = Uuid::new_v4();
        let order_id = Uuid::new_v4();
        let grant = || BalanceMutation::GrantOneTime { credits: 500 };
        let note = || LedgerNote::new("One-time credit purchase", Some(order_id)).once_per_order();

        assert!(!store.has_log_for_order(order_id, CreditLogType::OneTimePurchase).await.unwrap());
        assert!(store.apply(user_id, grant(), note()).await.unwrap().is_some());
        assert!(store.apply(user_id, grant(), note()).await.unwrap().is_none());

        let usage = store.get_usage(user_id).await.unwrap().unwrap();
        assert_eq!(usage.one_time_credits_balance, 500);
        assert!(store.has_log_for_order(order_id, CreditLogType::OneTimePurchase).await.unwrap());
        assert!(!store.has_log_for_order(order_id, CreditLogType::RefundRevoke).await.unwrap());
    }

    #[tokio::test]
    async fn unguarded_notes_may_share_an_order() {
        let store = MemoryCreditStore::new();
        let user_id = Uuid::new_v4();
        let order_id = Uuid::new_v4();

        for _ in 0..2 {
            store
                .apply(
                    user_id,
                    BalanceMutation::GrantOneTime { credits: 100 },
                    LedgerNote::new("One-time credit purchase", Some(order_id)),
                )
                .await
                .unwrap();
        }

        let usage = store.get_usage(user_id).await.unwrap().unwrap();
        assert_eq!(usage.one_time_credits_balance, 200);
        assert_eq!(store.list_logs(user_id).await.unwrap().len(), 2);
    }
}
