use std::sync::Arc;

use log::{error, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::order::{ORDER_STATUS_PENDING, ORDER_STATUS_REFUNDED, ORDER_STATUS_SUCCEEDED};
use crate::models::subscription::SUBSCRIPTION_STATUS_CANCELED;
use crate::models::{Order, OrderType, PaymentProvider, SubscriptionRecord};
use crate::providers::{CreemAdapter, PaymentProviderAdapter, StripeAdapter};
use crate::services::order_ledger::OrderLedger;
use crate::services::subscription_sync::SubscriptionSynchronizer;
use crate::stripe_types::{CheckoutSession, CHECKOUT_SESSION_MODE_PAYMENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Active,
    Paid,
    Pending,
}

/// What the success page shows after a checkout redirect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    pub status: VerificationStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_name: Option<String>,
}

impl VerificationResponse {
    fn pending(message: &str) -> Self {
        Self {
            status: VerificationStatus::Pending,
            message: message.to_string(),
            subscription_id: None,
            subscription_status: None,
            order_id: None,
            plan_id: None,
            plan_name: None,
        }
    }
}

const SUBSCRIPTION_PENDING: &str =
    "Payment successful! Subscription activation may take a moment. Please refresh shortly.";
const ORDER_PENDING: &str = "Payment successful! Order confirmation may take a moment. Please refresh shortly.";

fn metadata_string(metadata: &Value, key: &str) -> Option<String> {
    metadata.get(key).and_then(Value::as_str).map(str::to_string)
}

pub fn subscription_response(subscription: &SubscriptionRecord) -> AppResult<VerificationResponse> {
    if subscription.is_active() {
        return Ok(VerificationResponse {
            status: VerificationStatus::Active,
            message: "Subscription verified and active.".to_string(),
            subscription_id: Some(subscription.id),
            subscription_status: Some(subscription.status.clone()),
            order_id: None,
            plan_id: subscription.plan_id,
            plan_name: metadata_string(&subscription.metadata, "planName"),
        });
    }
    if subscription.status == SUBSCRIPTION_STATUS_CANCELED {
        return Err(AppError::ActionRequired(
            "Subscription was canceled. Maybe your charge was refunded. Please contact support.".to_string(),
        ));
    }
    Ok(VerificationResponse::pending(
        "Subscription found but not active yet. Please allow a few moments and refresh, or contact support if the problem persists.",
    ))
}

fn confirmed_order(order: &Order) -> VerificationResponse {
    VerificationResponse {
        status: VerificationStatus::Paid,
        message: "Payment verified and order confirmed.".to_string(),
        subscription_id: None,
        subscription_status: None,
        order_id: Some(order.id),
        plan_id: order.plan_id,
        plan_name: metadata_string(&order.metadata, "planName"),
    }
}

pub fn order_response(order: &Order) -> AppResult<VerificationResponse> {
    match order.status.as_str() {
        ORDER_STATUS_SUCCEEDED => Ok(confirmed_order(order)),
        ORDER_STATUS_REFUNDED => Err(AppError::ActionRequired(
            "Payment was refunded. Maybe your charge was refunded. Please contact support.".to_string(),
        )),
        _ => Ok(VerificationResponse::pending(
            "Payment recorded but not finalized yet. Please refresh in a moment, or contact support if the problem persists.",
        )),
    }
}

/// Creem one-time orders keep the provider's own status until they settle.
pub fn creem_order_response(order: &Order) -> AppResult<VerificationResponse> {
    match order.status.as_str() {
        ORDER_STATUS_SUCCEEDED => Ok(confirmed_order(order)),
        ORDER_STATUS_PENDING | "processing" | "completed" => Ok(VerificationResponse::pending(
            "Payment recorded but not finalized yet. Please refresh in a moment.",
        )),
        _ => Err(AppError::ActionRequired(
            "Payment status is not pending, processing, or completed. Please contact support if the problem persists."
                .to_string(),
        )),
    }
}

fn ensure_owner(
    metadata_user: Option<&str>,
    user_id: Uuid,
    checkout_id: &str,
    provider: PaymentProvider,
) -> AppResult<()> {
    match metadata_user {
        Some(owner) if owner != user_id.to_string() => {
            warn!(
                "[Verify API] User ID mismatch for {} session {}. Auth User: {}, Meta User: {}",
                provider, checkout_id, user_id, owner
            );
            Err(AppError::Forbidden("User ID mismatch.".to_string()))
        }
        _ => Ok(()),
    }
}

/// Unknown checkout ids become "Invalid session ID."; other provider failures are generic.
fn checkout_lookup_error(provider: PaymentProvider, checkout_id: &str, err: AppError) -> AppError {
    error!("[Verify API] Error retrieving {} checkout session {}: {}", provider, checkout_id, err);
    match err {
        AppError::NotFound(_) => AppError::NotFound("Invalid session ID.".to_string()),
        AppError::External(_) => AppError::External("Failed to verify payment.".to_string()),
        other => other,
    }
}

/// Confirms a checkout after the provider redirects the user back.
///
/// The subscription is synced on the spot so the page does not depend on the
/// webhook having arrived; a failed sync only degrades the answer to pending.
pub struct PaymentVerifier {
    orders: OrderLedger,
    subscriptions: SubscriptionSynchronizer,
    stripe: Option<Arc<StripeAdapter>>,
    creem: Option<Arc<CreemAdapter>>,
}

impl PaymentVerifier {
    pub fn new(
        orders: OrderLedger,
        subscriptions: SubscriptionSynchronizer,
        stripe: Option<Arc<StripeAdapter>>,
        creem: Option<Arc<CreemAdapter>>,
    ) -> Self {
        Self { orders, subscriptions, stripe, creem }
    }

    async fn synced_subscription(
        &self,
        adapter: &dyn PaymentProviderAdapter,
        subscription_id: &str,
        user_id: Uuid,
        hint: &Map<String, Value>,
        checkout_id: &str,
    ) -> AppResult<VerificationResponse> {
        if let Err(e) = self.subscriptions.sync(adapter, subscription_id, Some(hint)).await {
            error!(
                "[Verify API] Error during {} subscription sync for session {}: {}",
                adapter.provider(),
                checkout_id,
                e
            );
        }

        match self
            .subscriptions
            .store()
            .find_for_user(subscription_id, user_id)
            .await?
        {
            Some(subscription) => subscription_response(&subscription),
            None => {
                warn!(
                    "[Verify API] {} subscription {} not found in DB for user {}. Status might be pending webhook processing.",
                    adapter.provider(),
                    subscription_id,
                    user_id
                );
                Ok(VerificationResponse::pending(SUBSCRIPTION_PENDING))
            }
        }
    }

    pub async fn verify_stripe(&self, session_id: &str, user_id: Uuid) -> AppResult<VerificationResponse> {
        let adapter = self.stripe.as_ref().ok_or_else(|| {
            AppError::Configuration("Stripe is not initialized. Please check your environment variables.".to_string())
        })?;

        let session: CheckoutSession = adapter
            .api()
            .retrieve_checkout_session(session_id)
            .await
            .map_err(|e| checkout_lookup_error(PaymentProvider::Stripe, session_id, e))?;

        ensure_owner(session.metadata_value("userId"), user_id, session_id, PaymentProvider::Stripe)?;

        if !session.is_complete() {
            return Err(AppError::BadRequest(format!(
                "Checkout session status is not complete ({})",
                session.status.as_deref().unwrap_or("unknown")
            )));
        }

        if session.is_subscription() && session.subscription.is_some() {
            let (Some(subscription_id), Some(_customer_id)) = (session.subscription_id(), session.customer_id())
            else {
                error!(
                    "[Verify API] Missing subscription or customer ID for Stripe session {}",
                    session_id
                );
                return Err(AppError::External("Could not verify subscription details.".to_string()));
            };
            let hint: Map<String, Value> = session
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            return self
                .synced_subscription(&**adapter, subscription_id, user_id, &hint, session_id)
                .await;
        }

        if session.mode != CHECKOUT_SESSION_MODE_PAYMENT {
            return Err(AppError::BadRequest("Unsupported Stripe checkout session mode.".to_string()));
        }

        if !session.is_paid() {
            return Err(AppError::BadRequest(format!(
                "Payment status is not paid ({})",
                session.payment_status.as_deref().unwrap_or("unknown")
            )));
        }

        let payment_intent_id = session.payment_intent_id().unwrap_or(session.id.as_str());
        match self
            .orders
            .find_for_user(PaymentProvider::Stripe, payment_intent_id, user_id, OrderType::OneTimePurchase)
            .await?
        {
            Some(order) => order_response(&order),
            None => {
                warn!(
                    "[Verify API] Stripe order for payment intent {} not found via webhook.",
                    payment_intent_id
                );
                Ok(VerificationResponse::pending(ORDER_PENDING))
            }
        }
    }

    pub async fn verify_creem(&self, checkout_id: &str, user_id: Uuid) -> AppResult<VerificationResponse> {
        let adapter = self.creem.as_ref().ok_or_else(|| {
            AppError::Configuration("Creem is not initialized. Please check your environment variables.".to_string())
        })?;

        let checkout = adapter
            .api()
            .retrieve_checkout(checkout_id)
            .await
            .map_err(|e| checkout_lookup_error(PaymentProvider::Creem, checkout_id, e))?;

        ensure_owner(checkout.metadata_value("userId"), user_id, checkout_id, PaymentProvider::Creem)?;

        if !checkout.is_completed() {
            return Err(AppError::BadRequest(format!(
                "Checkout session status is not completed ({})",
                checkout.status
            )));
        }

        let Some(order) = checkout.order.as_ref() else {
            return Err(AppError::BadRequest(format!(
                "Creem checkout {} has no order",
                checkout_id
            )));
        };

        if order.is_recurring() {
            let (Some(subscription_id), Some(_customer_id)) = (checkout.subscription_id(), checkout.customer_id())
            else {
                error!(
                    "[Verify API] Missing subscription or customer ID for Creem session {}",
                    checkout_id
                );
                return Err(AppError::External("Could not verify subscription details.".to_string()));
            };
            return self
                .synced_subscription(&**adapter, subscription_id, user_id, &checkout.metadata, checkout_id)
                .await;
        }

        if !order.is_onetime() {
            return Err(AppError::BadRequest(format!(
                "Unsupported Creem checkout order type: {}",
                order.order_type
            )));
        }

        match self
            .orders
            .find_for_user(PaymentProvider::Creem, &order.id, user_id, OrderType::OneTimePurchase)
            .await?
        {
            Some(order) => creem_order_response(&order),
            None => {
                warn!("[Verify API] Creem order {} not found via webhook.", order.id);
                Ok(VerificationResponse::pending(
                    "Payment successful! Order confirmation may take a moment. Please refresh shortly, or contact support if the problem persists.",
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOrder;
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn order_with_status(status: &str) -> Order {
        let mut order = NewOrder::new(
            Uuid::new_v4(),
            PaymentProvider::Creem,
            "ord_1",
            OrderType::OneTimePurchase,
            BigDecimal::from(10),
            "usd",
        );
        order.status = status.to_string();
        order.metadata = json!({"planName": "Starter"});
        order.into_order(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn succeeded_order_is_confirmed_with_plan_name() {
        let order = order_with_status(ORDER_STATUS_SUCCEEDED);
        let response = order_response(&order).unwrap();
        assert_eq!(response.status, VerificationStatus::Paid);
        assert_eq!(response.order_id, Some(order.id));
        assert_eq!(response.plan_name.as_deref(), Some("Starter"));
    }

    #[test]
    fn refunded_order_requires_action() {
        let err = order_response(&order_with_status(ORDER_STATUS_REFUNDED)).unwrap_err();
        assert!(matches!(err, AppError::ActionRequired(msg) if msg.starts_with("Payment was refunded")));
    }

    #[test]
    fn creem_statuses_outside_the_known_set_are_errors() {
        let pending = creem_order_response(&order_with_status("processing")).unwrap();
        assert_eq!(pending.status, VerificationStatus::Pending);
        assert!(creem_order_response(&order_with_status("failed")).is_err());
    }

    #[test]
    fn mismatched_owner_is_forbidden() {
        let user = Uuid::new_v4();
        assert!(ensure_owner(None, user, "cs_1", PaymentProvider::Stripe).is_ok());
        assert!(ensure_owner(Some(&user.to_string()), user, "cs_1", PaymentProvider::Stripe).is_ok());
        let err = ensure_owner(Some("someone-else"), user, "cs_1", PaymentProvider::Stripe).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(msg) if msg == "User ID mismatch."));
    }

    #[test]
    fn pending_response_omits_empty_ids() {
        let body = serde_json::to_value(VerificationResponse::pending(ORDER_PENDING)).unwrap();
        assert_eq!(body, json!({"status": "pending", "message": ORDER_PENDING}));
    }
}
