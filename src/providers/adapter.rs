use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{CreemApi, StripeApi};
use crate::creem_types::CreemSubscription;
use crate::db::{PlanStore, SubscriptionStore, UserDirectory};
use crate::error::AppError;
use crate::models::{PaymentProvider, RefundReference};
use crate::stripe_types::Subscription;

/// Provider subscription state normalised for the synchroniser.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSubscription {
    pub subscription_id: String,
    pub customer_id: String,
    pub status: String,
    pub price_id: Option<String>,
    pub product_id: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    /// Metadata attached to the subscription at checkout.
    pub metadata: Map<String, Value>,
    /// Provider object ids recorded alongside the metadata.
    pub references: Map<String, Value>,
}

impl ProviderSubscription {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Everything provider specific the ledger services need.
#[async_trait]
pub trait PaymentProviderAdapter: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// How a refund for the given external id finds its original order.
    fn refund_reference(&self, external_id: &str) -> RefundReference;

    async fn fetch_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription, AppError>;

    /// Fallback owner lookup when the subscription metadata has no user id.
    async fn resolve_user(&self, subscription: &ProviderSubscription) -> Result<Option<Uuid>, AppError>;

    /// Fallback plan lookup when the subscription metadata has no plan id.
    async fn resolve_plan(&self, subscription: &ProviderSubscription) -> Result<Option<Uuid>, AppError>;
}

fn from_unix(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds.and_then(|s| DateTime::from_timestamp(s, 0))
}

fn string_map<'a>(entries: impl Iterator<Item = (&'a String, &'a String)>) -> Map<String, Value> {
    entries
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

pub struct StripeAdapter {
    api: Arc<dyn StripeApi>,
    plans: Arc<dyn PlanStore>,
    users: Arc<dyn UserDirectory>,
}

impl StripeAdapter {
    pub fn new(api: Arc<dyn StripeApi>, plans: Arc<dyn PlanStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self { api, plans, users }
    }

    pub fn api(&self) -> &Arc<dyn StripeApi> {
        &self.api
    }

    /// User id for a Stripe customer: the users table first, then the customer's metadata.
    pub async fn user_for_customer(&self, customer_id: &str) -> Result<Option<Uuid>, AppError> {
        if let Some(user_id) = self.users.find_user_id_by_stripe_customer(customer_id).await? {
            return Ok(Some(user_id));
        }
        let customer = self.api.retrieve_customer(customer_id).await?;
        if customer.deleted {
            return Ok(None);
        }
        Ok(customer
            .metadata
            .get("userId")
            .and_then(|raw| Uuid::parse_str(raw).ok()))
    }

    pub fn normalize(subscription: &Subscription) -> ProviderSubscription {
        let customer_id = subscription.customer.id().to_string();
        let mut references = Map::new();
        references.insert("stripeSubscriptionId".into(), Value::String(subscription.id.clone()));
        references.insert("stripeCustomerId".into(), Value::String(customer_id.clone()));

        ProviderSubscription {
            subscription_id: subscription.id.clone(),
            customer_id,
            status: subscription.status.clone(),
            price_id: subscription.price_id().map(str::to_string),
            product_id: subscription.product_id().map(str::to_string),
            current_period_start: from_unix(subscription.period_start()),
            current_period_end: from_unix(subscription.period_end()),
            cancel_at_period_end: subscription.cancel_at_period_end,
            canceled_at: from_unix(subscription.canceled_at),
            ended_at: from_unix(subscription.ended_at),
            trial_start: from_unix(subscription.trial_start),
            trial_end: from_unix(subscription.trial_end),
            metadata: string_map(subscription.metadata.iter()),
            references,
        }
    }
}

#[async_trait]
impl PaymentProviderAdapter for StripeAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    fn refund_reference(&self, external_id: &str) -> RefundReference {
        RefundReference::PaymentIntent(external_id.to_string())
    }

    async fn fetch_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription, AppError> {
        let subscription = self.api.retrieve_subscription(subscription_id).await?;
        Ok(Self::normalize(&subscription))
    }

    async fn resolve_user(&self, subscription: &ProviderSubscription) -> Result<Option<Uuid>, AppError> {
        self.user_for_customer(&subscription.customer_id).await
    }

    async fn resolve_plan(&self, subscription: &ProviderSubscription) -> Result<Option<Uuid>, AppError> {
        match &subscription.price_id {
            Some(price_id) => Ok(self.plans.find_by_stripe_price_id(price_id).await?.map(|p| p.id)),
            None => Ok(None),
        }
    }
}

pub struct CreemAdapter {
    api: Arc<dyn CreemApi>,
    plans: Arc<dyn PlanStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl CreemAdapter {
    pub fn new(
        api: Arc<dyn CreemApi>,
        plans: Arc<dyn PlanStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
    ) -> Self {
        Self { api, plans, subscriptions }
    }

    pub fn api(&self) -> &Arc<dyn CreemApi> {
        &self.api
    }

    pub fn normalize(subscription: &CreemSubscription) -> ProviderSubscription {
        let product_id = subscription.product_id().to_string();
        let customer_id = subscription.customer_id().to_string();
        let mut references = Map::new();
        references.insert("creemSubscriptionId".into(), Value::String(subscription.id.clone()));
        references.insert("creemCustomerId".into(), Value::String(customer_id.clone()));
        references.insert("creemProductId".into(), Value::String(product_id.clone()));

        ProviderSubscription {
            subscription_id: subscription.id.clone(),
            customer_id,
            status: subscription.status.clone(),
            price_id: subscription.items.first().and_then(|item| item.price_id.clone()),
            product_id: Some(product_id),
            current_period_start: subscription.current_period_start_date,
            current_period_end: subscription.current_period_end_date,
            cancel_at_period_end: subscription.status == "scheduled_cancel",
            canceled_at: subscription.canceled_at,
            ended_at: if subscription.status == "canceled" {
                subscription.current_period_end_date
            } else {
                None
            },
            trial_start: None,
            trial_end: None,
            metadata: subscription.metadata.clone(),
            references,
        }
    }
}

#[async_trait]
impl PaymentProviderAdapter for CreemAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Creem
    }

    fn refund_reference(&self, external_id: &str) -> RefundReference {
        RefundReference::ProviderOrder(external_id.to_string())
    }

    async fn fetch_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription, AppError> {
        let subscription = self.api.retrieve_subscription(subscription_id).await?;
        Ok(Self::normalize(&subscription))
    }

    // Creem customers are not linked to users; reuse the owner of an earlier sync.
    async fn resolve_user(&self, subscription: &ProviderSubscription) -> Result<Option<Uuid>, AppError> {
        Ok(self
            .subscriptions
            .find_by_subscription_id(&subscription.subscription_id)
            .await?
            .map(|row| row.user_id))
    }

    async fn resolve_plan(&self, subscription: &ProviderSubscription) -> Result<Option<Uuid>, AppError> {
        match &subscription.product_id {
            Some(product_id) => Ok(self.plans.find_by_creem_product_id(product_id).await?.map(|p| p.id)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn creem_scheduled_cancel_sets_cancel_at_period_end() {
        let subscription: CreemSubscription = serde_json::from_value(json!({
            "id": "sub_c",
            "product": {"id": "prod_9"},
            "customer": {"id": "cust_9"},
            "status": "scheduled_cancel",
            "current_period_end_date": "2026-05-01T00:00:00Z",
            "items": [{"id": "item_1", "price_id": "pprice_1"}]
        }))
        .unwrap();

        let normalized = CreemAdapter::normalize(&subscription);
        assert!(normalized.cancel_at_period_end);
        assert_eq!(normalized.ended_at, None);
        assert_eq!(normalized.price_id.as_deref(), Some("pprice_1"));
        assert_eq!(normalized.references["creemProductId"], json!("prod_9"));
    }

    #[test]
    fn stripe_normalization_reads_item_period() {
        let subscription: Subscription = serde_json::from_value(json!({
            "id": "sub_s",
            "customer": "cus_s",
            "status": "canceled",
            "ended_at": 1_700_000_000,
            "items": {"data": [{"id": "si", "price": {"id": "price_m"}, "current_period_start": 1_699_000_000}]},
            "metadata": {"userId": "00000000-0000-0000-0000-000000000001"}
        }))
        .unwrap();

        let normalized = StripeAdapter::normalize(&subscription);
        assert_eq!(normalized.customer_id, "cus_s");
        assert_eq!(normalized.price_id.as_deref(), Some("price_m"));
        assert_eq!(normalized.ended_at.map(|d| d.timestamp()), Some(1_700_000_000));
        assert_eq!(
            normalized.metadata_str("userId"),
            Some("00000000-0000-0000-0000-000000000001")
        );
    }
}
