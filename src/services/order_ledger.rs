use std::sync::Arc;

use log::{info, warn};
use uuid::Uuid;

use crate::db::OrderStore;
use crate::error::{AppError, AppResult};
use crate::models::order::{ORDER_STATUS_PARTIALLY_REFUNDED, ORDER_STATUS_REFUNDED};
use crate::models::{NewOrder, Order, OrderType, PaymentProvider, RefundReference};
use crate::utils::currency::to_currency_amount;

#[derive(Debug, Clone)]
pub struct CreateOrderOutcome {
    pub order: Order,
    /// True when the event was already recorded; callers must skip every side effect.
    pub existed: bool,
}

/// At-most-once ledger of provider financial events, keyed by
/// `(provider, provider_order_id)`.
#[derive(Clone)]
pub struct OrderLedger {
    orders: Arc<dyn OrderStore>,
}

impl OrderLedger {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }

    /// Records `order` unless an order with the same external key exists.
    ///
    /// The lookup is only a shortcut. A concurrent delivery that wins the
    /// insert race surfaces here as `AlreadyExists`, which is answered by
    /// re-reading the winner's row.
    pub async fn create_order_with_idempotency(
        &self,
        mut order: NewOrder,
        external_key: &str,
    ) -> AppResult<CreateOrderOutcome> {
        let provider = order.provider;
        order.provider_order_id = external_key.to_string();

        if let Some(existing) = self.orders.find_by_provider_order_id(provider, external_key).await? {
            info!("{} order {} already processed, skipping", provider, external_key);
            return Ok(CreateOrderOutcome { order: existing, existed: true });
        }

        match self.orders.insert(order).await {
            Ok(order) => {
                info!(
                    "Recorded {} {} order {} for user {}",
                    provider, order.order_type, external_key, order.user_id
                );
                Ok(CreateOrderOutcome { order, existed: false })
            }
            Err(AppError::AlreadyExists(_)) => {
                warn!("Concurrent delivery recorded {} order {} first", provider, external_key);
                let existing = self
                    .orders
                    .find_by_provider_order_id(provider, external_key)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "Order {} reported as duplicate but could not be re-read",
                            external_key
                        ))
                    })?;
                Ok(CreateOrderOutcome { order: existing, existed: true })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn find_by_provider_order_id(
        &self,
        provider: PaymentProvider,
        provider_order_id: &str,
    ) -> AppResult<Option<Order>> {
        self.orders.find_by_provider_order_id(provider, provider_order_id).await
    }

    pub async fn find_original_order_for_refund(
        &self,
        provider: PaymentProvider,
        reference: &RefundReference,
    ) -> AppResult<Option<Order>> {
        self.orders.find_original_for_refund(provider, reference).await
    }

    /// Marks the original order refunded or partially refunded and returns the status written.
    pub async fn update_order_status_after_refund(
        &self,
        order_id: Uuid,
        refunded_minor_units: i64,
        original_minor_units: i64,
    ) -> AppResult<&'static str> {
        let status = refund_status(refunded_minor_units, original_minor_units);
        self.orders.update_status(order_id, status).await?;
        info!(
            "Order {} marked {} ({} of {} refunded)",
            order_id,
            status,
            to_currency_amount(Some(refunded_minor_units)),
            to_currency_amount(Some(original_minor_units))
        );
        Ok(status)
    }

    pub async fn refund_order_exists(&self, provider: PaymentProvider, refund_id: &str) -> AppResult<bool> {
        Ok(self
            .orders
            .find_by_provider_order_id(provider, refund_id)
            .await?
            .is_some_and(|order| order.is_refund()))
    }

    pub async fn find_for_user(
        &self,
        provider: PaymentProvider,
        provider_order_id: &str,
        user_id: Uuid,
        order_type: OrderType,
    ) -> AppResult<Option<Order>> {
        self.orders
            .find_for_user(provider, provider_order_id, user_id, order_type)
            .await
    }
}

pub fn refund_status(refunded_minor_units: i64, original_minor_units: i64) -> &'static str {
    if refunded_minor_units == original_minor_units {
        ORDER_STATUS_REFUNDED
    } else {
        ORDER_STATUS_PARTIALLY_REFUNDED
    }
}
