use std::sync::Arc;

use log::{error, info, warn};
use uuid::Uuid;

use crate::db::{PlanStore, UserDirectory};
use crate::error::AppResult;
use crate::models::{CreditLog, CreditLogType, Order, PaymentProvider};
use crate::services::credit_manager::CreditManager;
use crate::services::notification_service::{CreditUpgradeFailure, Notifier};
use crate::services::order_ledger::OrderLedger;
use crate::services::subscription_sync::SubscriptionSynchronizer;

/// The provider-neutral services both webhook processors share.
#[derive(Clone)]
pub struct LedgerServices {
    pub orders: OrderLedger,
    pub credits: CreditManager,
    pub subscriptions: SubscriptionSynchronizer,
    pub plans: Arc<dyn PlanStore>,
    pub users: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub default_currency: String,
}

impl LedgerServices {
    /// Reports a failed credit grant to the operators and hands the original error back.
    ///
    /// The notification is best effort; its own failure is only logged.
    pub async fn report_grant_failure(
        &self,
        provider: PaymentProvider,
        user_id: Uuid,
        order_id: Uuid,
        plan_id: Uuid,
        result: AppResult<Option<CreditLog>>,
    ) -> AppResult<Option<CreditLog>> {
        let err = match result {
            Ok(log) => return Ok(log),
            Err(err) => err,
        };

        error!(
            "CRITICAL: Failed to upgrade credits for user {}, order {}: {}",
            user_id, order_id, err
        );
        let failure = CreditUpgradeFailure {
            provider,
            user_id,
            order_id,
            plan_id,
            error: err.to_string(),
        };
        if let Err(notify_err) = self.notifier.credit_upgrade_failed(&failure).await {
            error!("Failed to send credit upgrade failure notice for order {}: {}", order_id, notify_err);
        }
        Err(err)
    }

    /// Whether an order recorded by an earlier delivery still lacks its credit grant.
    pub async fn grant_pending(&self, order_id: Uuid, log_type: CreditLogType) -> AppResult<bool> {
        if self.credits.entry_recorded(order_id, log_type).await? {
            return Ok(false);
        }
        warn!("Order {} was recorded without its {} entry; retrying the grant", order_id, log_type);
        Ok(true)
    }

    /// Whether a refund recorded by an earlier delivery still owes its credit revocation.
    ///
    /// Only full refunds revoke credits, so a partial refund never has anything pending.
    pub async fn revocation_pending(&self, original: &Order, fully_refunded: bool) -> AppResult<bool> {
        if !fully_refunded || self.credits.entry_recorded(original.id, CreditLogType::RefundRevoke).await? {
            return Ok(false);
        }
        warn!("Refund of order {} was recorded without its revocation; retrying it", original.id);
        Ok(true)
    }

    /// Takes back the credits a refunded order granted.
    ///
    /// Subscription orders lose their allocation only on a full refund. One-time
    /// orders are checked for a full refund by the credit manager itself.
    pub async fn revoke_for_refund(
        &self,
        original: &Order,
        refunded_minor_units: i64,
        fully_refunded: bool,
        refund_order_id: Option<Uuid>,
    ) -> AppResult<()> {
        if original.subscription_id.is_none() {
            self.credits
                .revoke_one_time_credits(refunded_minor_units, original, refund_order_id)
                .await?;
        } else if fully_refunded {
            self.credits
                .revoke_subscription_credits(original, refund_order_id)
                .await?;
        } else {
            info!("Partial refund on subscription order {}; allocation left untouched", original.id);
        }
        Ok(())
    }
}
