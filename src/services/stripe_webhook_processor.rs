use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::order::ORDER_STATUS_REFUNDED;
use crate::models::{CreditLogType, NewOrder, Order, OrderType, PaymentProvider};
use crate::providers::{PaymentProviderAdapter, StripeAdapter};
use crate::services::fraud_responder::FraudResponder;
use crate::services::ledger_services::LedgerServices;
use crate::services::notification_service::InvoicePaymentFailedNotice;
use crate::services::subscription_change::{route_change, SubscriptionChangeDetector, SubscriptionChangeHandler};
use crate::services::subscription_sync::metadata_uuid;
use crate::stripe_types::*;
use crate::utils::currency::{to_currency_amount, to_minor_units};

fn string_map(metadata: &HashMap<String, String>) -> Map<String, Value> {
    metadata
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

/// `base` followed by the provider metadata; provider keys win on collision.
fn with_metadata(base: Value, metadata: &HashMap<String, String>) -> Value {
    let mut merged = match base {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    merged.extend(string_map(metadata));
    Value::Object(merged)
}

fn parse_uuid(raw: Option<&str>) -> Option<Uuid> {
    raw.and_then(|v| Uuid::parse_str(v).ok())
}

/// Applies verified Stripe events to the ledger.
pub struct StripeWebhookProcessor {
    services: LedgerServices,
    adapter: Arc<StripeAdapter>,
    changes: SubscriptionChangeDetector,
    change_handler: Arc<dyn SubscriptionChangeHandler>,
    fraud: FraudResponder,
}

impl StripeWebhookProcessor {
    pub fn new(
        services: LedgerServices,
        adapter: Arc<StripeAdapter>,
        change_handler: Arc<dyn SubscriptionChangeHandler>,
        fraud: FraudResponder,
    ) -> Self {
        let changes = SubscriptionChangeDetector::new(services.plans.clone());
        Self { services, adapter, changes, change_handler, fraud }
    }

    /// Dispatches one event. An `Err` means the event should be redelivered.
    pub async fn process(&self, event: &Event) -> AppResult<()> {
        info!("Processing Stripe event {} ({})", event.id, event.type_);
        match event.type_.as_str() {
            EVENT_CHECKOUT_SESSION_COMPLETED => {
                self.handle_checkout_session_completed(&event.object()?).await
            }
            EVENT_INVOICE_PAID => self.handle_invoice_paid(&event.object()?).await,
            EVENT_SUBSCRIPTION_CREATED => self.handle_subscription_update(&event.object()?, None, false).await,
            EVENT_SUBSCRIPTION_UPDATED => {
                let previous_price_id = event
                    .data
                    .previous_attributes
                    .as_ref()
                    .and_then(|attrs| attrs.pointer("/items/data/0/price/id"))
                    .and_then(Value::as_str);
                self.handle_subscription_update(&event.object()?, previous_price_id, false)
                    .await
            }
            EVENT_SUBSCRIPTION_DELETED => self.handle_subscription_update(&event.object()?, None, true).await,
            EVENT_INVOICE_PAYMENT_FAILED => self.handle_invoice_payment_failed(&event.object()?).await,
            EVENT_CHARGE_REFUNDED => self.handle_refund(&event.object()?).await,
            EVENT_EARLY_FRAUD_WARNING_CREATED => {
                let warning: EarlyFraudWarning = event.object()?;
                let response = self.fraud.handle_early_fraud_warning(&warning).await?;
                info!("Fraud warning {} handled: {:?}", warning.id, response.actions_taken);
                Ok(())
            }
            other => {
                warn!("Unhandled Stripe event type: {}", other);
                Ok(())
            }
        }
    }

    async fn handle_checkout_session_completed(&self, session: &CheckoutSession) -> AppResult<()> {
        let user_id = parse_uuid(session.metadata_value("userId"));
        let plan_id = parse_uuid(session.metadata_value("planId"));
        let price_id = session.metadata_value("priceId");
        let (Some(user_id), Some(plan_id), Some(price_id)) = (user_id, plan_id, price_id) else {
            error!(
                "Critical metadata (userId, planId, priceId) missing in checkout session {}: {:?}",
                session.id, session.metadata
            );
            return Ok(());
        };

        if session.mode != CHECKOUT_SESSION_MODE_PAYMENT {
            // Subscription checkouts are recorded from invoice.paid.
            return Ok(());
        }

        let payment_intent_id = match session.payment_intent_id() {
            Some(id) => id.to_string(),
            None => {
                error!(
                    "Payment Intent ID missing from completed checkout session (mode=payment): {}",
                    session.id
                );
                session.id.clone()
            }
        };

        let mut order = NewOrder::new(
            user_id,
            PaymentProvider::Stripe,
            &payment_intent_id,
            OrderType::OneTimePurchase,
            to_currency_amount(session.amount_total),
            session
                .currency
                .clone()
                .unwrap_or_else(|| self.services.default_currency.clone()),
        );
        order.stripe_payment_intent_id = Some(payment_intent_id.clone());
        order.plan_id = Some(plan_id);
        order.price_id = Some(price_id.to_string());
        order.amount_subtotal = Some(to_currency_amount(session.amount_subtotal));
        order.amount_discount = Some(to_currency_amount(session.amount_discount()));
        order.amount_tax = Some(to_currency_amount(session.amount_tax()));
        order.metadata = with_metadata(json!({ "stripeCheckoutSessionId": session.id }), &session.metadata);

        let outcome = self
            .services
            .orders
            .create_order_with_idempotency(order, &payment_intent_id)
            .await?;
        let order_id = outcome.order.id;
        if outcome.existed
            && !self
                .services
                .grant_pending(order_id, CreditLogType::OneTimePurchase)
                .await?
        {
            return Ok(());
        }

        let result = self
            .services
            .credits
            .upgrade_one_time_credits(user_id, plan_id, order_id)
            .await;
        self.services
            .report_grant_failure(PaymentProvider::Stripe, user_id, order_id, plan_id, result)
            .await?;
        Ok(())
    }

    async fn handle_invoice_paid(&self, invoice: &Invoice) -> AppResult<()> {
        let subscription_id = invoice.subscription_id();
        let customer_id = invoice.customer_id();
        let is_subscription_invoice = invoice
            .billing_reason
            .as_deref()
            .is_some_and(|reason| reason.starts_with("subscription"));
        let (Some(subscription_id), Some(customer_id), true, true) = (
            subscription_id,
            customer_id,
            invoice.status.as_deref() == Some(INVOICE_STATUS_PAID),
            is_subscription_invoice,
        ) else {
            warn!(
                "Invoice {} is not a paid subscription invoice or missing essential IDs. \
                 Status: {:?}, Subscription: {:?}, Customer: {:?}, Billing Reason: {:?}. Skipping.",
                invoice.id, invoice.status, subscription_id, customer_id, invoice.billing_reason
            );
            return Ok(());
        };

        let existing = self
            .services
            .orders
            .find_by_provider_order_id(PaymentProvider::Stripe, &invoice.id)
            .await?;
        let needs_recording = match existing {
            None => true,
            Some(order) => {
                order.plan_id.is_some()
                    && self
                        .services
                        .grant_pending(order.id, CreditLogType::SubscriptionGrant)
                        .await?
            }
        };
        if needs_recording {
            self.record_subscription_invoice(invoice, subscription_id, customer_id)
                .await?;
        }

        if let Err(e) = self
            .services
            .subscriptions
            .sync(&*self.adapter, subscription_id, None)
            .await
        {
            error!("Error during post-invoice sync for sub {}: {}", subscription_id, e);
        }
        Ok(())
    }

    async fn record_subscription_invoice(
        &self,
        invoice: &Invoice,
        subscription_id: &str,
        customer_id: &str,
    ) -> AppResult<()> {
        let api = self.adapter.api();
        let subscription = api.retrieve_subscription(subscription_id).await?;
        let price_id = subscription.price_id().map(str::to_string);

        let plan_id = match &price_id {
            Some(price_id) => self
                .services
                .plans
                .find_by_stripe_price_id(price_id)
                .await?
                .map(|plan| plan.id),
            None => None,
        }
        .or_else(|| parse_uuid(subscription.metadata_value("planId")));

        let user_id = match parse_uuid(subscription.metadata_value("userId")) {
            Some(user_id) => Some(user_id),
            None => self.adapter.user_for_customer(customer_id).await?,
        };
        let Some(user_id) = user_id else {
            error!("FATAL: User ID could not be determined for invoice {}. Cannot create order.", invoice.id);
            return Err(AppError::Internal(format!(
                "User ID determination failed for invoice {}.",
                invoice.id
            )));
        };
        if plan_id.is_none() {
            warn!(
                "Could not determine planId for subscription {} from invoice {}. Order created, but credit grant may fail.",
                subscription_id, invoice.id
            );
        }

        let payment_intent_id = match invoice.payment_intent_id() {
            Some(id) => Some(id.to_string()),
            None => api.invoice_payment_intent(&invoice.id).await?,
        };

        let order_type = if invoice.billing_reason.as_deref() == Some(BILLING_REASON_SUBSCRIPTION_CREATE) {
            OrderType::SubscriptionInitial
        } else {
            OrderType::SubscriptionRenewal
        };
        let mut order = NewOrder::new(
            user_id,
            PaymentProvider::Stripe,
            &invoice.id,
            order_type,
            to_currency_amount(Some(invoice.amount_paid)),
            invoice
                .currency
                .clone()
                .unwrap_or_else(|| self.services.default_currency.clone()),
        );
        order.stripe_payment_intent_id = payment_intent_id;
        order.stripe_invoice_id = Some(invoice.id.clone());
        order.subscription_id = Some(subscription_id.to_string());
        order.plan_id = plan_id;
        order.price_id = price_id;
        order.product_id = subscription.product_id().map(str::to_string);
        order.amount_subtotal = Some(to_currency_amount(invoice.subtotal));
        order.amount_discount = Some(to_currency_amount(Some(invoice.discount_total())));
        order.amount_tax = Some(to_currency_amount(Some(invoice.tax_total())));
        order.metadata = with_metadata(
            json!({
                "stripeInvoiceId": invoice.id,
                "stripeSubscriptionId": subscription_id,
                "stripeCustomerId": customer_id,
                "billingReason": invoice.billing_reason,
            }),
            &invoice.metadata,
        );

        let outcome = self
            .services
            .orders
            .create_order_with_idempotency(order, &invoice.id)
            .await?;
        if outcome.existed
            && !self
                .services
                .grant_pending(outcome.order.id, CreditLogType::SubscriptionGrant)
                .await?
        {
            return Ok(());
        }

        let Some(plan_id) = plan_id else {
            warn!(
                "Cannot grant subscription credits for invoice {} because the plan is unknown.",
                invoice.id
            );
            return Ok(());
        };

        let order_id = outcome.order.id;
        let period_start = subscription
            .period_start()
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .unwrap_or_else(Utc::now);
        let result = self
            .services
            .credits
            .upgrade_subscription_credits(user_id, plan_id, order_id, period_start)
            .await;
        self.services
            .report_grant_failure(PaymentProvider::Stripe, user_id, order_id, plan_id, result)
            .await?;
        Ok(())
    }

    async fn handle_subscription_update(
        &self,
        subscription: &Subscription,
        previous_price_id: Option<&str>,
        is_deleted: bool,
    ) -> AppResult<()> {
        let customer_id = subscription.customer.id();
        let hint = string_map(&subscription.metadata);

        self.services
            .subscriptions
            .sync(&*self.adapter, &subscription.id, Some(&hint))
            .await
            .inspect_err(|e| {
                error!("Error syncing subscription {} during update event: {}", subscription.id, e)
            })?;

        let metadata_user = metadata_uuid(&hint, "userId");

        if let (Some(previous), Some(current)) = (previous_price_id, subscription.price_id()) {
            let change = self.changes.detect(previous, current).await?;
            match metadata_user {
                Some(user_id) => {
                    route_change(self.change_handler.as_ref(), user_id, &subscription.id, &change).await?
                }
                None => warn!(
                    "Subscription {} changed ({}) but carries no userId; change not routed",
                    subscription.id, change.change_type
                ),
            }
        }

        if !is_deleted {
            return Ok(());
        }

        let user_id = match metadata_user {
            Some(user_id) => Some(user_id),
            None => self
                .services
                .users
                .find_user_id_by_stripe_customer(customer_id)
                .await
                .unwrap_or_else(|e| {
                    error!(
                        "Error retrieving customer {} for subscription {}: {}",
                        customer_id, subscription.id, e
                    );
                    None
                }),
        };
        let Some(user_id) = user_id else {
            error!(
                "No user found for deleted subscription {} (customer {}); remaining credits not revoked",
                subscription.id, customer_id
            );
            return Ok(());
        };

        self.services
            .credits
            .revoke_remaining_subscription_credits_on_end(
                PaymentProvider::Stripe,
                &subscription.id,
                user_id,
                &Value::Object(hint),
            )
            .await?;
        Ok(())
    }

    async fn handle_invoice_payment_failed(&self, invoice: &Invoice) -> AppResult<()> {
        let (Some(subscription_id), Some(customer_id)) = (invoice.subscription_id(), invoice.customer_id()) else {
            warn!(
                "Skipping invoice.payment_failed handler for invoice {}: Could not determine subscriptionId ({:?}) or customerId ({:?}).",
                invoice.id,
                invoice.subscription_id(),
                invoice.customer_id()
            );
            return Ok(());
        };

        let record = self
            .services
            .subscriptions
            .sync(&*self.adapter, subscription_id, None)
            .await
            .inspect_err(|e| {
                error!(
                    "Error syncing subscription {} during invoice.payment_failed handling for invoice {}: {}",
                    subscription_id, invoice.id, e
                )
            })?;

        let notice = InvoicePaymentFailedNotice {
            user_id: record.map(|r| r.user_id),
            invoice_id: invoice.id.clone(),
            subscription_id: subscription_id.to_string(),
            customer_id: customer_id.to_string(),
        };
        if let Err(e) = self.services.notifier.invoice_payment_failed(&notice).await {
            error!("Error sending payment failed email for invoice {}: {}", invoice.id, e);
        }
        Ok(())
    }

    async fn handle_refund(&self, charge: &Charge) -> AppResult<()> {
        // `refunded` only turns true once the whole charge is refunded; partial refunds still count.
        if charge.amount_refunded <= 0 {
            return Ok(());
        }

        let Some(payment_intent_id) = charge.payment_intent.as_ref().map(|pi| pi.id()) else {
            error!("Payment intent missing from refunded charge: {}. Cannot process refund fully.", charge.id);
            return Ok(());
        };
        let Some(customer_id) = charge.customer.as_ref().map(|c| c.id()) else {
            error!("Customer ID missing from refunded charge: {}. Cannot process refund fully.", charge.id);
            return Ok(());
        };

        let latest_refund = charge.latest_refund();
        let refund_id = latest_refund.map_or(charge.id.as_str(), |refund| refund.id.as_str());
        let refund_amount = latest_refund
            .map(|refund| refund.amount)
            .filter(|amount| *amount > 0)
            .unwrap_or(charge.amount_refunded);

        let orders = &self.services.orders;
        let reference = self.adapter.refund_reference(payment_intent_id);
        let Some(original) = orders
            .find_original_order_for_refund(self.adapter.provider(), &reference)
            .await?
        else {
            error!("Original order for payment intent {} not found.", payment_intent_id);
            return Ok(());
        };
        self.check_refund_customer(&original, customer_id).await;

        // amount_refunded is cumulative across every refund on the charge.
        let status = orders
            .update_order_status_after_refund(
                original.id,
                charge.amount_refunded,
                to_minor_units(&original.amount_total),
            )
            .await?;
        let fully_refunded = status == ORDER_STATUS_REFUNDED;

        if orders.refund_order_exists(self.adapter.provider(), refund_id).await? {
            if !self.services.revocation_pending(&original, fully_refunded).await? {
                info!("Refund {} for charge {} already processed", refund_id, charge.id);
                return Ok(());
            }
            return self
                .services
                .revoke_for_refund(&original, charge.amount_refunded, fully_refunded, None)
                .await;
        }

        let mut refund = NewOrder::new(
            original.user_id,
            PaymentProvider::Stripe,
            refund_id,
            OrderType::Refund,
            -to_currency_amount(Some(refund_amount)),
            charge.currency.clone(),
        );
        refund.stripe_payment_intent_id = Some(payment_intent_id.to_string());
        refund.stripe_charge_id = Some(charge.id.clone());
        refund.plan_id = original.plan_id;
        refund.metadata = with_metadata(
            json!({
                "stripeRefundId": refund_id,
                "stripeChargeId": charge.id,
                "stripePaymentIntentId": payment_intent_id,
                "stripeCustomerId": customer_id,
                "originalOrderId": original.id,
                "refundReason": charge.refund_reason(),
            }),
            &charge.metadata,
        );

        let outcome = orders.create_order_with_idempotency(refund, refund_id).await?;
        if outcome.existed {
            return Ok(());
        }

        self.services
            .revoke_for_refund(&original, charge.amount_refunded, fully_refunded, Some(outcome.order.id))
            .await
    }

    /// Cross-checks the refunded charge's customer against the owner of the original order.
    ///
    /// The order's user stays authoritative; a mismatch is only reported.
    async fn check_refund_customer(&self, original: &Order, customer_id: &str) {
        match self.adapter.user_for_customer(customer_id).await {
            Ok(Some(user_id)) if user_id != original.user_id => warn!(
                "Refunded charge customer {} belongs to user {}, but order {} belongs to user {}",
                customer_id, user_id, original.id, original.user_id
            ),
            Ok(Some(_)) => {}
            Ok(None) => warn!(
                "No user found for Stripe customer {} on refunded order {}",
                customer_id, original.id
            ),
            Err(e) => warn!(
                "Failed to look up Stripe customer {} for refund of order {}: {}",
                customer_id, original.id, e
            ),
        }
    }
}
