use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use log::{error, info, warn};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::db::balance::{BalanceMutation, LedgerNote, first_of_next_month, month_key};
use crate::db::{CreditStore, PlanStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    AllocationState, BillingInterval, CreditLog, CreditLogType, MonthlyAllocation, Order, PaymentProvider,
    PricingPlan, YearlyAllocation,
};
use crate::services::retry_policy::RetryPolicy;
use crate::utils::currency::{is_full_refund, to_minor_units};

/// Counts from one pass of the yearly allocator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearlyAllocationSummary {
    pub due: usize,
    pub allocated: usize,
    pub failed: usize,
}

/// Turns plan benefits into balance mutations.
///
/// Grants run under the retry policy and propagate their final error so the
/// webhook fails and the provider redelivers. Every mutation goes through
/// [`CreditStore::apply`], which locks the usage row for the whole
/// read-compute-write cycle.
#[derive(Clone)]
pub struct CreditManager {
    plans: Arc<dyn PlanStore>,
    credits: Arc<dyn CreditStore>,
    retry: RetryPolicy,
}

impl CreditManager {
    pub fn new(plans: Arc<dyn PlanStore>, credits: Arc<dyn CreditStore>, retry: RetryPolicy) -> Self {
        Self { plans, credits, retry }
    }

    pub fn credits(&self) -> &Arc<dyn CreditStore> {
        &self.credits
    }

    /// Whether `order_id` already has an audit row of `log_type`.
    ///
    /// The ledger row commits before its balance change, so a delivery that failed
    /// in between leaves an order without its entry for the redelivery to finish.
    pub async fn entry_recorded(&self, order_id: Uuid, log_type: CreditLogType) -> AppResult<bool> {
        self.credits.has_log_for_order(order_id, log_type).await
    }

    async fn plan(&self, plan_id: Uuid) -> AppResult<PricingPlan> {
        self.plans
            .find_by_id(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Could not fetch plan benefits for {}", plan_id)))
    }

    async fn apply_with_retry(
        &self,
        label: &str,
        user_id: Uuid,
        mutation: BalanceMutation,
        note: LedgerNote,
    ) -> AppResult<Option<CreditLog>> {
        let credits = &self.credits;
        self.retry
            .run(label, move || credits.apply(user_id, mutation.clone(), note.clone()))
            .await
    }

    pub async fn upgrade_one_time_credits(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        order_id: Uuid,
    ) -> AppResult<Option<CreditLog>> {
        let credits = self.plan(plan_id).await?.benefits().one_time_credits;
        if credits <= 0 {
            info!(
                "No one-time credits defined for plan {}. Skipping credit grant for order {}",
                plan_id, order_id
            );
            return Ok(None);
        }

        let log = self
            .apply_with_retry(
                "one-time credit grant",
                user_id,
                BalanceMutation::GrantOneTime { credits },
                LedgerNote::new("One-time credit purchase", Some(order_id)).once_per_order(),
            )
            .await?;
        info!("Granted {} one-time credits to user {} for order {}", credits, user_id, order_id);
        Ok(log)
    }

    /// Grants one billing period of subscription credits.
    ///
    /// Monthly plans reset the balance to `monthlyCredits`. Yearly plans reset it
    /// to one month's worth and start an allocation that the yearly allocator
    /// advances on the first of each following month.
    pub async fn upgrade_subscription_credits(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        order_id: Uuid,
        period_start: DateTime<Utc>,
    ) -> AppResult<Option<CreditLog>> {
        let plan = self.plan(plan_id).await?;
        let benefits = plan.benefits();

        let (mutation, notes) = match plan.interval() {
            Some(BillingInterval::Monthly) if benefits.monthly_credits > 0 => (
                BalanceMutation::ResetSubscription {
                    credits: benefits.monthly_credits,
                    allocation: AllocationState::Monthly(MonthlyAllocation {
                        monthly_credits: benefits.monthly_credits,
                        related_order_id: Some(order_id),
                    }),
                },
                "Subscription credits granted/reset",
            ),
            Some(BillingInterval::Yearly) if benefits.monthly_credits > 0 && benefits.total_months > 0 => {
                let start = period_start.date_naive();
                (
                    BalanceMutation::ResetSubscription {
                        credits: benefits.monthly_credits,
                        allocation: AllocationState::Yearly(YearlyAllocation {
                            remaining_months: benefits.total_months - 1,
                            next_credit_date: first_of_next_month(start),
                            monthly_credits: benefits.monthly_credits,
                            last_allocated_month: month_key(start),
                            related_order_id: Some(order_id),
                        }),
                    },
                    "Yearly plan initial credits granted",
                )
            }
            interval => {
                info!(
                    "Plan {} ({:?}) defines no subscription credits. Skipping grant for order {}",
                    plan_id, interval, order_id
                );
                return Ok(None);
            }
        };

        let log = self
            .apply_with_retry(
                "subscription credit grant",
                user_id,
                mutation,
                LedgerNote::new(notes, Some(order_id)).once_per_order(),
            )
            .await?;
        info!(
            "Granted {} subscription credits to user {} for order {}",
            benefits.monthly_credits, user_id, order_id
        );
        Ok(log)
    }

    /// Removes a one-time plan's credits, but only when the refund covers the full order total.
    pub async fn revoke_one_time_credits(
        &self,
        refund_minor_units: i64,
        original: &Order,
        refund_order_id: Option<Uuid>,
    ) -> AppResult<Option<CreditLog>> {
        if !is_full_refund(refund_minor_units, &original.amount_total) {
            info!(
                "Refund for order {} is partial ({} of {}). One-time credits left untouched",
                original.id,
                refund_minor_units,
                to_minor_units(&original.amount_total)
            );
            return Ok(None);
        }

        let Some(plan) = self.plan_for_refund(original, refund_order_id).await? else {
            return Ok(None);
        };
        let credits = plan.benefits().one_time_credits;
        if credits <= 0 {
            info!("No credits defined to revoke for plan {} on order {}", plan.id, original.id);
            return Ok(None);
        }

        let log = self
            .apply_with_retry(
                "one-time credit revocation",
                original.user_id,
                BalanceMutation::RevokeOneTime { credits },
                LedgerNote::new(format!("Full refund for order {}.", original.id), Some(original.id))
                    .once_per_order(),
            )
            .await?;
        info!("Revoked one-time credits for user {} after refund of order {}", original.user_id, original.id);
        Ok(log)
    }

    /// Removes the current allocation's monthly credits after a refunded subscription charge.
    pub async fn revoke_subscription_credits(
        &self,
        original: &Order,
        refund_order_id: Option<Uuid>,
    ) -> AppResult<Option<CreditLog>> {
        let Some(plan) = self.plan_for_refund(original, refund_order_id).await? else {
            return Ok(None);
        };
        let Some(interval) = plan.interval() else {
            warn!("Plan {} has no recurring interval; nothing to revoke for order {}", plan.id, original.id);
            return Ok(None);
        };

        let log = self
            .apply_with_retry(
                "subscription credit revocation",
                original.user_id,
                BalanceMutation::RevokeAllocation { interval },
                LedgerNote::new(
                    format!("Full refund for subscription order {}.", original.id),
                    Some(original.id),
                )
                .once_per_order(),
            )
            .await?;
        info!(
            "Revoked subscription credits for user {} related to subscription {:?}",
            original.user_id, original.subscription_id
        );
        Ok(log)
    }

    async fn plan_for_refund(
        &self,
        original: &Order,
        refund_order_id: Option<Uuid>,
    ) -> AppResult<Option<PricingPlan>> {
        let Some(plan_id) = original.plan_id else {
            warn!("Order {} has no plan; nothing to revoke", original.id);
            return Ok(None);
        };
        let plan = self.plans.find_by_id(plan_id).await?;
        if plan.is_none() {
            error!(
                "Plan {} for order {} not found while revoking credits for refund {:?}",
                plan_id, original.id, refund_order_id
            );
        }
        Ok(plan)
    }

    /// Forfeits the whole remaining subscription balance once a subscription has ended.
    pub async fn revoke_remaining_subscription_credits_on_end(
        &self,
        provider: PaymentProvider,
        subscription_id: &str,
        user_id: Uuid,
        metadata: &Value,
    ) -> AppResult<Option<CreditLog>> {
        let log = self
            .apply_with_retry(
                "subscription end revocation",
                user_id,
                BalanceMutation::RevokeEntireSubscription,
                LedgerNote::new(
                    format!("{} subscription {} ended; remaining credits revoked.", provider, subscription_id),
                    None,
                ),
            )
            .await?;
        info!(
            "Revoked remaining subscription credits on end for subscription {}, user {} (metadata: {})",
            subscription_id, user_id, metadata
        );
        Ok(log)
    }

    /// Credits the next month of a yearly plan if it is due on `today`.
    pub async fn allocate_yearly_month(&self, user_id: Uuid, today: NaiveDate) -> AppResult<Option<CreditLog>> {
        let related_order_id = match self.credits.get_usage(user_id).await? {
            Some(usage) => match usage.allocation {
                AllocationState::Yearly(yearly) => yearly.related_order_id,
                _ => return Ok(None),
            },
            None => return Ok(None),
        };

        self.apply_with_retry(
            "yearly monthly allocation",
            user_id,
            BalanceMutation::AllocateYearlyMonth { today },
            LedgerNote::new(
                format!("Yearly plan credits allocated for {}", month_key(today)),
                related_order_id,
            ),
        )
        .await
    }

    pub async fn run_yearly_allocation(&self, today: NaiveDate) -> AppResult<YearlyAllocationSummary> {
        let due = self.credits.users_with_due_yearly_allocation(today).await?;
        let mut summary = YearlyAllocationSummary { due: due.len(), ..Default::default() };

        for user_id in due {
            match self.allocate_yearly_month(user_id, today).await {
                Ok(Some(_)) => summary.allocated += 1,
                Ok(None) => {}
                Err(e) => {
                    error!("Yearly allocation failed for user {}: {}", user_id, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Yearly allocation for {}: {} due, {} allocated, {} failed",
            today, summary.due, summary.allocated, summary.failed
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MemoryCreditStore, MemoryPlanStore};
    use crate::models::{CreditLogType, NewOrder, OrderType, Usage};
    use crate::services::retry_policy::tests::RecordingSleeper;
    use bigdecimal::BigDecimal;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const USER: Uuid = Uuid::from_u128(1);
    const PACK: Uuid = Uuid::from_u128(10);
    const MONTHLY: Uuid = Uuid::from_u128(11);
    const YEARLY: Uuid = Uuid::from_u128(12);

    fn plan(id: Uuid, interval: Option<&str>, benefits: Value) -> PricingPlan {
        PricingPlan {
            id,
            card_title: "Plan".to_string(),
            stripe_price_id: None,
            stripe_product_id: None,
            creem_product_id: None,
            payment_type: None,
            recurring_interval: interval.map(str::to_string),
            price: None,
            currency: Some("usd".to_string()),
            benefits_jsonb: benefits,
            is_active: true,
        }
    }

    fn manager() -> (CreditManager, Arc<MemoryCreditStore>) {
        let plans = Arc::new(MemoryPlanStore::new(vec![
            plan(PACK, None, json!({"oneTimeCredits": 500})),
            plan(MONTHLY, Some("month"), json!({"monthlyCredits": 300})),
            plan(YEARLY, Some("year"), json!({"monthlyCredits": 100, "totalMonths": 12})),
        ]));
        let credits = Arc::new(MemoryCreditStore::new());
        let retry = RetryPolicy::credit_default().with_sleeper(Arc::new(RecordingSleeper::default()));
        (CreditManager::new(plans, credits.clone(), retry), credits)
    }

    fn order(plan_id: Uuid, total: i64, subscription: Option<&str>) -> Order {
        let mut new = NewOrder::new(
            USER,
            PaymentProvider::Stripe,
            "pi_1",
            OrderType::OneTimePurchase,
            BigDecimal::from(total),
            "usd",
        );
        new.plan_id = Some(plan_id);
        new.subscription_id = subscription.map(str::to_string);
        new.into_order(Uuid::from_u128(99), Utc::now())
    }

    async fn usage(credits: &MemoryCreditStore) -> Usage {
        credits.get_usage(USER).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn one_time_grant_then_full_refund_returns_to_zero() {
        let (manager, credits) = manager();
        manager.upgrade_one_time_credits(USER, PACK, Uuid::new_v4()).await.unwrap();
        assert_eq!(usage(&credits).await.one_time_credits_balance, 500);

        let original = order(PACK, 20, None);
        let partial = manager.revoke_one_time_credits(1000, &original, None).await.unwrap();
        assert!(partial.is_none());
        assert_eq!(usage(&credits).await.one_time_credits_balance, 500);

        let log = manager.revoke_one_time_credits(2000, &original, None).await.unwrap().unwrap();
        assert_eq!(log.amount, -500);
        assert_eq!(log.log_type, CreditLogType::RefundRevoke);
        assert_eq!(usage(&credits).await.one_time_credits_balance, 0);
    }

    #[tokio::test]
    async fn monthly_renewals_reset_instead_of_adding() {
        let (manager, credits) = manager();
        let start = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        manager.upgrade_subscription_credits(USER, MONTHLY, Uuid::new_v4(), start).await.unwrap();
        manager.upgrade_subscription_credits(USER, MONTHLY, Uuid::new_v4(), start).await.unwrap();

        let usage = usage(&credits).await;
        assert_eq!(usage.subscription_credits_balance, 300);
        assert_eq!(usage.allocation.monthly_credits(), 300);
        let logs = credits.list_logs(USER).await.unwrap();
        assert_eq!(logs.iter().map(|l| l.amount).collect::<Vec<_>>(), vec![300, 0]);
    }

    #[tokio::test]
    async fn yearly_grant_starts_allocation_from_period_start() {
        let (manager, credits) = manager();
        let start = Utc.with_ymd_and_hms(2026, 3, 20, 8, 0, 0).unwrap();
        manager.upgrade_subscription_credits(USER, YEARLY, Uuid::new_v4(), start).await.unwrap();

        let usage = usage(&credits).await;
        assert_eq!(usage.subscription_credits_balance, 100);
        let AllocationState::Yearly(yearly) = usage.allocation else {
            panic!("expected yearly allocation");
        };
        assert_eq!(yearly.remaining_months, 11);
        assert_eq!(yearly.next_credit_date, NaiveDate::from_ymd_opt(2026, 4, 1).unwrap());
        assert_eq!(yearly.last_allocated_month, "2026-03");
    }

    #[tokio::test]
    async fn missing_plan_is_not_found() {
        let (manager, _) = manager();
        let err = manager
            .upgrade_one_time_credits(USER, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m.starts_with("Could not fetch plan benefits")));
    }

    #[tokio::test]
    async fn subscription_end_forfeits_entire_balance() {
        let (manager, credits) = manager();
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        manager.upgrade_subscription_credits(USER, MONTHLY, Uuid::new_v4(), start).await.unwrap();
        manager.upgrade_one_time_credits(USER, PACK, Uuid::new_v4()).await.unwrap();

        let log = manager
            .revoke_remaining_subscription_credits_on_end(PaymentProvider::Creem, "sub_1", USER, &json!({}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.amount, -300);
        assert_eq!(log.log_type, CreditLogType::SubscriptionEndedRevoke);
        assert_eq!(log.notes.as_deref(), Some("creem subscription sub_1 ended; remaining credits revoked."));

        let usage = usage(&credits).await;
        assert_eq!(usage.subscription_credits_balance, 0);
        assert_eq!(usage.one_time_credits_balance, 500);
        assert!(usage.allocation.is_none());
    }

    #[tokio::test]
    async fn subscription_refund_revokes_matching_allocation() {
        let (manager, credits) = manager();
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        manager.upgrade_subscription_credits(USER, YEARLY, Uuid::new_v4(), start).await.unwrap();

        let log = manager
            .revoke_subscription_credits(&order(YEARLY, 120, Some("sub_1")), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.amount, -100);
        assert!(usage(&credits).await.allocation.is_none());
    }

    #[tokio::test]
    async fn yearly_allocator_credits_each_due_user_once() {
        let (manager, credits) = manager();
        let start = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        manager.upgrade_subscription_credits(USER, YEARLY, Uuid::new_v4(), start).await.unwrap();

        let early = manager.run_yearly_allocation(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()).await.unwrap();
        assert_eq!(early, YearlyAllocationSummary::default());

        let feb = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let first = manager.run_yearly_allocation(feb).await.unwrap();
        assert_eq!(first, YearlyAllocationSummary { due: 1, allocated: 1, failed: 0 });
        let again = manager.run_yearly_allocation(feb).await.unwrap();
        assert_eq!(again.allocated, 0);

        let AllocationState::Yearly(yearly) = usage(&credits).await.allocation else {
            panic!("expected yearly allocation");
        };
        assert_eq!(yearly.remaining_months, 10);
        assert_eq!(yearly.last_allocated_month, "2026-02");
    }
}
