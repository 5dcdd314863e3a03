use std::sync::Arc;

use log::{info, warn};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::db::SubscriptionStore;
use crate::error::AppResult;
use crate::models::{SubscriptionRecord, SubscriptionUpsert};
use crate::providers::{PaymentProviderAdapter, ProviderSubscription};

/// Reads a UUID from a metadata map; absent, empty and malformed values are all `None`.
pub fn metadata_uuid(metadata: &Map<String, Value>, key: &str) -> Option<Uuid> {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Ignoring malformed {} in metadata: {}", key, raw);
                None
            }
        })
}

/// Mirrors the provider's current view of a subscription into the subscriptions table.
///
/// The provider object is always re-fetched, so out-of-order webhooks converge
/// on the latest state. Calling it repeatedly has no effect beyond the upsert.
#[derive(Clone)]
pub struct SubscriptionSynchronizer {
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl SubscriptionSynchronizer {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        Self { subscriptions }
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.subscriptions
    }

    /// `metadata_hint` (checkout or event metadata) wins over the subscription's own metadata.
    /// Returns `None` when no owning user can be resolved.
    pub async fn sync(
        &self,
        adapter: &dyn PaymentProviderAdapter,
        subscription_id: &str,
        metadata_hint: Option<&Map<String, Value>>,
    ) -> AppResult<Option<SubscriptionRecord>> {
        let subscription = adapter.fetch_subscription(subscription_id).await?;
        let metadata = merged_metadata(&subscription, metadata_hint);

        let user_id = match metadata_uuid(&metadata, "userId") {
            Some(user_id) => Some(user_id),
            None => adapter.resolve_user(&subscription).await?,
        };
        let Some(user_id) = user_id else {
            warn!(
                "Cannot sync {} subscription {}: no user for customer {}",
                adapter.provider(),
                subscription_id,
                subscription.customer_id
            );
            return Ok(None);
        };

        let plan_id = match metadata_uuid(&metadata, "planId") {
            Some(plan_id) => Some(plan_id),
            None => adapter.resolve_plan(&subscription).await?,
        };
        if plan_id.is_none() {
            warn!("No plan resolved for {} subscription {}", adapter.provider(), subscription_id);
        }

        let record = self
            .subscriptions
            .upsert(SubscriptionUpsert {
                user_id,
                plan_id,
                provider: adapter.provider(),
                subscription_id: subscription.subscription_id.clone(),
                customer_id: subscription.customer_id.clone(),
                price_id: subscription.price_id.clone(),
                status: subscription.status.clone(),
                current_period_start: subscription.current_period_start,
                current_period_end: subscription.current_period_end,
                cancel_at_period_end: subscription.cancel_at_period_end,
                canceled_at: subscription.canceled_at,
                ended_at: subscription.ended_at,
                trial_start: subscription.trial_start,
                trial_end: subscription.trial_end,
                metadata: Value::Object(metadata),
            })
            .await?;

        info!(
            "Synced {} subscription {} for user {} (status {})",
            record.provider, record.subscription_id, record.user_id, record.status
        );
        Ok(Some(record))
    }
}

fn merged_metadata(
    subscription: &ProviderSubscription,
    hint: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let mut metadata = subscription.metadata.clone();
    if let Some(hint) = hint {
        for (key, value) in hint {
            metadata.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in &subscription.references {
        metadata.insert(key.clone(), value.clone());
    }
    metadata
}
