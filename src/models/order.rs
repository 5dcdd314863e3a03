use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

pub const ORDER_STATUS_SUCCEEDED: &str = "succeeded";
pub const ORDER_STATUS_REFUNDED: &str = "refunded";
pub const ORDER_STATUS_PARTIALLY_REFUNDED: &str = "partially_refunded";
pub const ORDER_STATUS_PENDING: &str = "pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Stripe,
    Creem,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Creem => "creem",
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(PaymentProvider::Stripe),
            "creem" => Ok(PaymentProvider::Creem),
            other => Err(AppError::InvalidArgument(format!(
                "Unsupported payment provider: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    OneTimePurchase,
    SubscriptionInitial,
    SubscriptionRenewal,
    Recurring,
    Refund,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::OneTimePurchase => "one_time_purchase",
            OrderType::SubscriptionInitial => "subscription_initial",
            OrderType::SubscriptionRenewal => "subscription_renewal",
            OrderType::Recurring => "recurring",
            OrderType::Refund => "refund",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_time_purchase" => Ok(OrderType::OneTimePurchase),
            "subscription_initial" => Ok(OrderType::SubscriptionInitial),
            "subscription_renewal" => Ok(OrderType::SubscriptionRenewal),
            "recurring" => Ok(OrderType::Recurring),
            "refund" => Ok(OrderType::Refund),
            other => Err(AppError::InvalidArgument(format!("Unknown order type: {}", other))),
        }
    }
}

super::impl_text_column!(PaymentProvider);
super::impl_text_column!(OrderType);

/// One row of the order ledger. `(provider, provider_order_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: PaymentProvider,
    pub provider_order_id: String,
    pub order_type: OrderType,
    pub status: String,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_invoice_id: Option<String>,
    pub stripe_charge_id: Option<String>,
    pub subscription_id: Option<String>,
    pub plan_id: Option<Uuid>,
    pub product_id: Option<String>,
    pub price_id: Option<String>,
    pub amount_subtotal: Option<BigDecimal>,
    pub amount_discount: Option<BigDecimal>,
    pub amount_tax: Option<BigDecimal>,
    pub amount_total: BigDecimal,
    pub currency: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_refund(&self) -> bool {
        self.order_type == OrderType::Refund
    }
}

/// Values for a ledger insert; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub provider: PaymentProvider,
    pub provider_order_id: String,
    pub order_type: OrderType,
    pub status: String,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_invoice_id: Option<String>,
    pub stripe_charge_id: Option<String>,
    pub subscription_id: Option<String>,
    pub plan_id: Option<Uuid>,
    pub product_id: Option<String>,
    pub price_id: Option<String>,
    pub amount_subtotal: Option<BigDecimal>,
    pub amount_discount: Option<BigDecimal>,
    pub amount_tax: Option<BigDecimal>,
    pub amount_total: BigDecimal,
    pub currency: String,
    pub metadata: Value,
}

impl NewOrder {
    /// A succeeded order with every optional field empty.
    pub fn new(
        user_id: Uuid,
        provider: PaymentProvider,
        provider_order_id: impl Into<String>,
        order_type: OrderType,
        amount_total: BigDecimal,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            provider,
            provider_order_id: provider_order_id.into(),
            order_type,
            status: ORDER_STATUS_SUCCEEDED.to_string(),
            stripe_payment_intent_id: None,
            stripe_invoice_id: None,
            stripe_charge_id: None,
            subscription_id: None,
            plan_id: None,
            product_id: None,
            price_id: None,
            amount_subtotal: None,
            amount_discount: None,
            amount_tax: None,
            amount_total,
            currency: currency.into(),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn into_order(self, id: Uuid, now: DateTime<Utc>) -> Order {
        Order {
            id,
            user_id: self.user_id,
            provider: self.provider,
            provider_order_id: self.provider_order_id,
            order_type: self.order_type,
            status: self.status,
            stripe_payment_intent_id: self.stripe_payment_intent_id,
            stripe_invoice_id: self.stripe_invoice_id,
            stripe_charge_id: self.stripe_charge_id,
            subscription_id: self.subscription_id,
            plan_id: self.plan_id,
            product_id: self.product_id,
            price_id: self.price_id,
            amount_subtotal: self.amount_subtotal,
            amount_discount: self.amount_discount,
            amount_tax: self.amount_tax,
            amount_total: self.amount_total,
            currency: self.currency,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// How a refund event points back at the order it refunds.
///
/// Stripe refunds carry the payment intent; Creem refunds carry the
/// provider order id directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundReference {
    PaymentIntent(String),
    ProviderOrder(String),
}

impl RefundReference {
    pub fn value(&self) -> &str {
        match self {
            RefundReference::PaymentIntent(id) | RefundReference::ProviderOrder(id) => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_type_round_trips_through_text() {
        for ty in [
            OrderType::OneTimePurchase,
            OrderType::SubscriptionInitial,
            OrderType::SubscriptionRenewal,
            OrderType::Recurring,
            OrderType::Refund,
        ] {
            assert_eq!(ty.as_str().parse::<OrderType>().unwrap(), ty);
        }
        assert!("gift".parse::<OrderType>().is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert_eq!("creem".parse::<PaymentProvider>().unwrap(), PaymentProvider::Creem);
        assert!(matches!(
            "paddle".parse::<PaymentProvider>(),
            Err(AppError::InvalidArgument(_))
        ));
    }
}
