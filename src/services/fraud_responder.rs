use std::sync::Arc;

use log::{error, info, warn};

use crate::config::FraudPolicy;
use crate::db::UserDirectory;
use crate::error::AppResult;
use crate::providers::StripeApi;
use crate::services::notification_service::{FraudRefundNotice, FraudWarningReport, Notifier};
use crate::stripe_types::EarlyFraudWarning;
use crate::utils::currency::to_currency_amount;

/// What the responder did about one early fraud warning.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FraudResponse {
    pub refunded: bool,
    pub canceled_subscription: Option<String>,
    pub actions_taken: Vec<String>,
}

/// Reacts to Stripe Radar early fraud warnings according to the configured policy.
pub struct FraudResponder {
    stripe: Arc<dyn StripeApi>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    policy: FraudPolicy,
}

impl FraudResponder {
    pub fn new(
        stripe: Arc<dyn StripeApi>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        policy: FraudPolicy,
    ) -> Self {
        Self { stripe, users, notifier, policy }
    }

    pub async fn handle_early_fraud_warning(&self, warning: &EarlyFraudWarning) -> AppResult<FraudResponse> {
        let Some(charge_id) = warning.charge.as_deref() else {
            error!("Charge ID missing from early fraud warning {}", warning.id);
            return Ok(FraudResponse::default());
        };

        if self.policy.is_disabled() {
            warn!(
                "Fraud warning {} for charge {} detected, but no automatic actions configured. \
                 Set STRIPE_RADAR_EARLY_FRAUD_WARNING_TYPE to enable automatic responses.",
                warning.id, charge_id
            );
            return Ok(FraudResponse::default());
        }

        let charge = self.stripe.retrieve_charge(charge_id).await?;
        let customer_id = charge.customer.as_ref().map(|c| c.id().to_string());
        let is_subscription_charge = charge
            .description
            .as_deref()
            .is_some_and(|d| d.contains("Subscription"));
        let mut response = FraudResponse::default();

        if self.policy.refund {
            if charge.refunded {
                info!("Charge {} already refunded", charge_id);
                response.actions_taken.push("Charge was already refunded".to_string());
            } else {
                self.stripe.create_refund(charge_id, "fraudulent").await?;
                response.refunded = true;
                info!("Refunded charge {} flagged by fraud warning {}", charge_id, warning.id);
                response.actions_taken.push("Automatic refund initiated".to_string());
            }

            // Also runs for an already refunded charge, so a redelivery finishes a failed cancellation.
            if let (true, Some(customer_id)) = (is_subscription_charge, customer_id.as_deref()) {
                response.canceled_subscription = self.cancel_latest_subscription(customer_id).await?;
            }
            if response.canceled_subscription.is_some() {
                response.actions_taken.push("Associated subscription cancelled".to_string());
            }
        }

        if self.policy.email {
            response
                .actions_taken
                .push("Fraud warning email sent to administrators".to_string());
            let report = FraudWarningReport {
                warning_id: warning.id.clone(),
                charge_id: charge_id.to_string(),
                customer_id: customer_id.clone(),
                amount: to_currency_amount(Some(charge.amount)),
                currency: charge.currency.clone(),
                fraud_type: warning
                    .fraud_type
                    .clone()
                    .unwrap_or_else(|| "Early Fraud Warning".to_string()),
                charge_description: charge.description.clone(),
                actions_taken: response.actions_taken.clone(),
            };
            if let Err(e) = self.notifier.fraud_warning_admin(&report).await {
                error!("Failed to send fraud warning admin email for charge {}: {}", charge_id, e);
            }

            if response.refunded {
                self.notify_user(charge_id, customer_id.as_deref(), charge.amount, &charge.currency)
                    .await;
            }
        }

        Ok(response)
    }

    async fn cancel_latest_subscription(&self, customer_id: &str) -> AppResult<Option<String>> {
        let latest = self.stripe.list_customer_subscriptions(customer_id, 1).await?;
        let Some(subscription) = latest.first() else {
            info!("No subscription to cancel for customer {}", customer_id);
            return Ok(None);
        };
        if subscription.status == "canceled" {
            return Ok(None);
        }
        self.stripe.cancel_subscription(&subscription.id).await?;
        info!("Cancelled subscription {} due to fraudulent charge", subscription.id);
        Ok(Some(subscription.id.clone()))
    }

    async fn notify_user(&self, charge_id: &str, customer_id: Option<&str>, amount: i64, currency: &str) {
        let user_id = match customer_id {
            Some(customer_id) => match self.users.find_user_id_by_stripe_customer(customer_id).await {
                Ok(user_id) => user_id,
                Err(e) => {
                    warn!("Could not resolve user for customer {}: {}", customer_id, e);
                    None
                }
            },
            None => None,
        };

        let notice = FraudRefundNotice {
            user_id,
            charge_id: charge_id.to_string(),
            amount: to_currency_amount(Some(amount)),
            currency: currency.to_string(),
        };
        if let Err(e) = self.notifier.fraud_refund_user(&notice).await {
            error!("Failed to send fraud refund user email for charge {}: {}", charge_id, e);
        }
    }
}
