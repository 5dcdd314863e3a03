use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde_json::{json, Map, Value};

use crate::creem_types::*;
use crate::error::{AppError, AppResult};
use crate::models::order::{ORDER_STATUS_REFUNDED, ORDER_STATUS_SUCCEEDED};
use crate::models::{CreditLogType, NewOrder, OrderType, PaymentProvider};
use crate::providers::{CreemAdapter, PaymentProviderAdapter};
use crate::services::ledger_services::LedgerServices;
use crate::services::subscription_sync::metadata_uuid;
use crate::utils::currency::to_currency_amount;

fn with_metadata(base: Value, metadata: Option<&Metadata>) -> Value {
    let mut merged = match base {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if let Some(metadata) = metadata {
        merged.extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    Value::Object(merged)
}

/// Creem reports `completed` checkouts and `paid` transactions; the ledger stores both as succeeded.
fn ledger_status(provider_status: &str, success: &str) -> String {
    if provider_status == success {
        ORDER_STATUS_SUCCEEDED.to_string()
    } else {
        provider_status.to_string()
    }
}

/// Applies verified Creem events to the ledger.
pub struct CreemWebhookProcessor {
    services: LedgerServices,
    adapter: Arc<CreemAdapter>,
}

impl CreemWebhookProcessor {
    pub fn new(services: LedgerServices, adapter: Arc<CreemAdapter>) -> Self {
        Self { services, adapter }
    }

    pub async fn process(&self, event: &CreemEvent) -> AppResult<()> {
        info!("[Creem webhook] Processing event {} ({})", event.id, event.event_type);
        match event.event_type.as_str() {
            EVENT_CHECKOUT_COMPLETED => self.handle_payment_succeeded(&event.object()?).await,
            EVENT_SUBSCRIPTION_PAID => self.handle_invoice_paid(&event.object()?).await,
            EVENT_SUBSCRIPTION_ACTIVE
            | EVENT_SUBSCRIPTION_UPDATE
            | EVENT_SUBSCRIPTION_EXPIRED
            | EVENT_SUBSCRIPTION_TRIALING
            | EVENT_SUBSCRIPTION_PAUSED => self.handle_subscription_updated(&event.object()?, false).await,
            EVENT_SUBSCRIPTION_CANCELED => self.handle_subscription_updated(&event.object()?, true).await,
            EVENT_REFUND_CREATED => self.handle_refund(&event.object()?).await,
            other => {
                warn!("[Creem webhook] Unhandled event type: {}", other);
                Ok(())
            }
        }
    }

    async fn handle_payment_succeeded(&self, checkout: &CreemCheckout) -> AppResult<()> {
        let user_id = metadata_uuid(&checkout.metadata, "userId");
        let plan_id = metadata_uuid(&checkout.metadata, "planId");
        let (Some(user_id), Some(plan_id)) = (user_id, plan_id) else {
            error!(
                "[Creem webhook] Missing critical metadata on checkout {}: {:?}",
                checkout.id, checkout.metadata
            );
            return Ok(());
        };

        let Some(order) = checkout.order.as_ref() else {
            error!("[Creem webhook] Checkout {} completed without an order", checkout.id);
            return Ok(());
        };
        if !order.is_onetime() {
            // Recurring payments are recorded from subscription.paid.
            return Ok(());
        }

        let product_id = checkout
            .metadata_value("productId")
            .or_else(|| checkout.product_id())
            .map(str::to_string);

        let mut new_order = NewOrder::new(
            user_id,
            PaymentProvider::Creem,
            &order.id,
            OrderType::OneTimePurchase,
            to_currency_amount(Some(order.amount_paid.unwrap_or(0))),
            order.currency.clone(),
        );
        new_order.status = ledger_status(&checkout.status, "completed");
        new_order.plan_id = Some(plan_id);
        new_order.product_id = product_id.clone();
        new_order.amount_subtotal = Some(to_currency_amount(Some(order.sub_total.unwrap_or(0))));
        new_order.amount_discount = Some(to_currency_amount(Some(order.discount_amount.unwrap_or(0))));
        new_order.amount_tax = Some(to_currency_amount(Some(order.tax_amount.unwrap_or(0))));
        new_order.metadata = with_metadata(
            json!({
                "creemPaymentId": checkout.id,
                "creemOrderId": order.id,
                "creemCustomerId": order.customer,
                "creemProductId": order.product,
                "productId": product_id,
            }),
            Some(&checkout.metadata),
        );

        let outcome = self
            .services
            .orders
            .create_order_with_idempotency(new_order, &order.id)
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
            .report_grant_failure(PaymentProvider::Creem, user_id, order_id, plan_id, result)
            .await?;
        Ok(())
    }

    async fn handle_invoice_paid(&self, subscription: &CreemSubscription) -> AppResult<()> {
        let subscription_id = subscription.id.as_str();
        let product_id = subscription.product_id();

        let Some(user_id) = metadata_uuid(&subscription.metadata, "userId") else {
            return Err(AppError::BadRequest(format!(
                "User ID is required for subscription payment {}",
                subscription_id
            )));
        };

        let plan_id = match metadata_uuid(&subscription.metadata, "planId") {
            Some(plan_id) => Some(plan_id),
            None => self
                .services
                .plans
                .find_by_creem_product_id(product_id)
                .await?
                .map(|plan| plan.id),
        };
        let Some(plan_id) = plan_id else {
            return Err(AppError::NotFound(format!(
                "Unable to determine plan for Creem subscription {}",
                subscription_id
            )));
        };

        let Some(transaction) = subscription.last_transaction.as_ref() else {
            return Err(AppError::BadRequest(format!(
                "Creem subscription {} was paid without a last transaction",
                subscription_id
            )));
        };
        let Some(order_id) = transaction.order.as_deref() else {
            return Err(AppError::BadRequest(format!(
                "Transaction {} on Creem subscription {} has no order",
                transaction.id, subscription_id
            )));
        };

        let mut order = NewOrder::new(
            user_id,
            PaymentProvider::Creem,
            order_id,
            OrderType::Recurring,
            to_currency_amount(Some(transaction.amount_paid)),
            transaction.currency.clone(),
        );
        order.status = ledger_status(&transaction.status, "paid");
        order.plan_id = Some(plan_id);
        order.price_id = Some(product_id.to_string());
        order.product_id = Some(product_id.to_string());
        order.subscription_id = Some(subscription_id.to_string());
        order.amount_subtotal = Some(to_currency_amount(Some(transaction.amount)));
        order.amount_discount = Some(to_currency_amount(Some(transaction.discount_amount)));
        order.amount_tax = Some(to_currency_amount(Some(transaction.tax_amount)));
        order.metadata = with_metadata(
            json!({
                "creemOrderId": order_id,
                "creemSubscriptionId": subscription_id,
                "creemCustomerId": subscription.customer_id(),
                "productId": product_id,
            }),
            Some(&subscription.metadata),
        );

        let outcome = self
            .services
            .orders
            .create_order_with_idempotency(order, order_id)
            .await?;

        let ledger_order_id = outcome.order.id;
        let grant_due = !outcome.existed
            || self
                .services
                .grant_pending(ledger_order_id, CreditLogType::SubscriptionGrant)
                .await?;
        if grant_due {
            let period_start = transaction
                .period_start
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or_else(Utc::now);
            let result = self
                .services
                .credits
                .upgrade_subscription_credits(user_id, plan_id, ledger_order_id, period_start)
                .await;
            self.services
                .report_grant_failure(PaymentProvider::Creem, user_id, ledger_order_id, plan_id, result)
                .await?;
        }

        self.services
            .subscriptions
            .sync(&*self.adapter, subscription_id, Some(&subscription.metadata))
            .await
            .inspect_err(|e| error!("[Creem webhook] Failed to sync subscription {}: {}", subscription_id, e))?;
        Ok(())
    }

    async fn handle_subscription_updated(&self, subscription: &CreemSubscription, is_deleted: bool) -> AppResult<()> {
        let subscription_id = subscription.id.as_str();
        let record = self
            .services
            .subscriptions
            .sync(&*self.adapter, subscription_id, Some(&subscription.metadata))
            .await
            .inspect_err(|e| error!("[Creem webhook] Failed to sync subscription {}: {}", subscription_id, e))?;

        if !is_deleted {
            return Ok(());
        }

        let user_id = match metadata_uuid(&subscription.metadata, "userId") {
            Some(user_id) => Some(user_id),
            None => match record {
                Some(record) => Some(record.user_id),
                None => self
                    .services
                    .subscriptions
                    .store()
                    .find_by_subscription_id(subscription_id)
                    .await?
                    .map(|row| row.user_id),
            },
        };
        let Some(user_id) = user_id else {
            error!(
                "[Creem webhook] No user found for canceled subscription {}; remaining credits not revoked",
                subscription_id
            );
            return Ok(());
        };

        self.services
            .credits
            .revoke_remaining_subscription_credits_on_end(
                PaymentProvider::Creem,
                subscription_id,
                user_id,
                &Value::Object(subscription.metadata.clone()),
            )
            .await?;
        Ok(())
    }

    async fn handle_refund(&self, refund: &CreemRefund) -> AppResult<()> {
        let orders = &self.services.orders;
        let reference = self.adapter.refund_reference(&refund.order.id);
        let Some(original) = orders
            .find_original_order_for_refund(self.adapter.provider(), &reference)
            .await?
        else {
            error!("[Creem webhook] Refund received for unknown order {}", refund.order.id);
            return Ok(());
        };

        let refunded = refund.refunded_minor_units();
        let status = orders
            .update_order_status_after_refund(original.id, refunded, refund.paid_minor_units())
            .await?;
        let fully_refunded = status == ORDER_STATUS_REFUNDED;

        if orders.refund_order_exists(self.adapter.provider(), &refund.id).await? {
            if !self.services.revocation_pending(&original, fully_refunded).await? {
                info!("[Creem webhook] Refund {} already processed", refund.id);
                return Ok(());
            }
            return self
                .services
                .revoke_for_refund(&original, refunded, fully_refunded, None)
                .await;
        }

        let mut refund_order = NewOrder::new(
            original.user_id,
            PaymentProvider::Creem,
            &refund.id,
            OrderType::Refund,
            -to_currency_amount(Some(refunded)),
            original.currency.clone(),
        );
        refund_order.status = refund.status.clone();
        refund_order.plan_id = original.plan_id;
        refund_order.product_id = original.product_id.clone();
        refund_order.metadata = with_metadata(
            json!({
                "creemRefundId": refund.id,
                "creemOrderId": refund.order.id,
                "originalOrderId": original.id,
            }),
            refund.checkout_metadata(),
        );

        let outcome = orders.create_order_with_idempotency(refund_order, &refund.id).await?;
        if outcome.existed {
            return Ok(());
        }

        self.services
            .revoke_for_refund(&original, refunded, fully_refunded, Some(outcome.order.id))
            .await
    }
}
