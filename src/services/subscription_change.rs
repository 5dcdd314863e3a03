use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use log::{info, warn};
use uuid::Uuid;

use crate::db::PlanStore;
use crate::error::AppResult;
use crate::models::{BillingInterval, PricingPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChangeType {
    MonthlyToMonthlyUpgrade,
    MonthlyToMonthlyDowngrade,
    YearlyToYearlyUpgrade,
    YearlyToYearlyDowngrade,
    MonthlyToYearlyChange,
    YearlyToMonthlyChange,
    None,
}

impl SubscriptionChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionChangeType::MonthlyToMonthlyUpgrade => "monthly_to_monthly_upgrade",
            SubscriptionChangeType::MonthlyToMonthlyDowngrade => "monthly_to_monthly_downgrade",
            SubscriptionChangeType::YearlyToYearlyUpgrade => "yearly_to_yearly_upgrade",
            SubscriptionChangeType::YearlyToYearlyDowngrade => "yearly_to_yearly_downgrade",
            SubscriptionChangeType::MonthlyToYearlyChange => "monthly_to_yearly_change",
            SubscriptionChangeType::YearlyToMonthlyChange => "yearly_to_monthly_change",
            SubscriptionChangeType::None => "none",
        }
    }
}

impl fmt::Display for SubscriptionChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An interval switch wins over a price difference; equal prices on the same
/// interval are no change.
pub fn classify_change(
    previous_interval: BillingInterval,
    current_interval: BillingInterval,
    previous_price: &BigDecimal,
    current_price: &BigDecimal,
) -> SubscriptionChangeType {
    use BillingInterval::{Monthly, Yearly};

    match (previous_interval, current_interval) {
        (Monthly, Yearly) => SubscriptionChangeType::MonthlyToYearlyChange,
        (Yearly, Monthly) => SubscriptionChangeType::YearlyToMonthlyChange,
        _ if current_price == previous_price => SubscriptionChangeType::None,
        (Monthly, Monthly) if current_price > previous_price => SubscriptionChangeType::MonthlyToMonthlyUpgrade,
        (Monthly, Monthly) => SubscriptionChangeType::MonthlyToMonthlyDowngrade,
        (Yearly, Yearly) if current_price > previous_price => SubscriptionChangeType::YearlyToYearlyUpgrade,
        (Yearly, Yearly) => SubscriptionChangeType::YearlyToYearlyDowngrade,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionChange {
    pub change_type: SubscriptionChangeType,
    pub previous_price_id: String,
    pub current_price_id: String,
    pub previous_plan_id: Option<Uuid>,
    pub current_plan_id: Option<Uuid>,
    pub previous_price: Option<BigDecimal>,
    pub current_price: Option<BigDecimal>,
}

impl SubscriptionChange {
    fn unchanged(previous_price_id: &str, current_price_id: &str) -> Self {
        Self {
            change_type: SubscriptionChangeType::None,
            previous_price_id: previous_price_id.to_string(),
            current_price_id: current_price_id.to_string(),
            previous_plan_id: None,
            current_plan_id: None,
            previous_price: None,
            current_price: None,
        }
    }
}

/// Compares the plans behind two Stripe prices.
#[derive(Clone)]
pub struct SubscriptionChangeDetector {
    plans: Arc<dyn PlanStore>,
}

impl SubscriptionChangeDetector {
    pub fn new(plans: Arc<dyn PlanStore>) -> Self {
        Self { plans }
    }

    pub async fn detect(&self, previous_price_id: &str, current_price_id: &str) -> AppResult<SubscriptionChange> {
        if previous_price_id.is_empty() || current_price_id.is_empty() || previous_price_id == current_price_id {
            return Ok(SubscriptionChange::unchanged(previous_price_id, current_price_id));
        }

        let (previous, current) = futures_util::try_join!(
            self.plans.find_by_stripe_price_id(previous_price_id),
            self.plans.find_by_stripe_price_id(current_price_id),
        )?;
        let (Some(previous), Some(current)) = (previous, current) else {
            warn!(
                "Could not find plan data for price comparison. Current: {}, Previous: {}",
                current_price_id, previous_price_id
            );
            return Ok(SubscriptionChange::unchanged(previous_price_id, current_price_id));
        };

        let change_type = match (previous.interval(), current.interval()) {
            (Some(from), Some(to)) => classify_change(from, to, &price_of(&previous), &price_of(&current)),
            _ => {
                warn!("Plan {} or {} has no recurring interval", previous.id, current.id);
                SubscriptionChangeType::None
            }
        };

        Ok(SubscriptionChange {
            change_type,
            previous_price_id: previous_price_id.to_string(),
            current_price_id: current_price_id.to_string(),
            previous_plan_id: Some(previous.id),
            current_plan_id: Some(current.id),
            previous_price: previous.price,
            current_price: current.price,
        })
    }
}

fn price_of(plan: &PricingPlan) -> BigDecimal {
    plan.price.clone().unwrap_or_default()
}

/// Proration policy for plan changes.
///
/// Each hook defaults to logging the change. Implementors override the cases
/// their pricing policy covers.
#[async_trait]
pub trait SubscriptionChangeHandler: Send + Sync {
    async fn monthly_upgrade(&self, user_id: Uuid, subscription_id: &str, change: &SubscriptionChange) -> AppResult<()> {
        log_change(user_id, subscription_id, change);
        Ok(())
    }

    async fn monthly_downgrade(&self, user_id: Uuid, subscription_id: &str, change: &SubscriptionChange) -> AppResult<()> {
        log_change(user_id, subscription_id, change);
        Ok(())
    }

    async fn yearly_upgrade(&self, user_id: Uuid, subscription_id: &str, change: &SubscriptionChange) -> AppResult<()> {
        log_change(user_id, subscription_id, change);
        Ok(())
    }

    async fn yearly_downgrade(&self, user_id: Uuid, subscription_id: &str, change: &SubscriptionChange) -> AppResult<()> {
        log_change(user_id, subscription_id, change);
        Ok(())
    }

    async fn monthly_to_yearly(&self, user_id: Uuid, subscription_id: &str, change: &SubscriptionChange) -> AppResult<()> {
        log_change(user_id, subscription_id, change);
        Ok(())
    }

    async fn yearly_to_monthly(&self, user_id: Uuid, subscription_id: &str, change: &SubscriptionChange) -> AppResult<()> {
        log_change(user_id, subscription_id, change);
        Ok(())
    }
}

fn log_change(user_id: Uuid, subscription_id: &str, change: &SubscriptionChange) {
    info!(
        "Subscription {} for user {}: {} from {} ({:?}) to {} ({:?})",
        subscription_id,
        user_id,
        change.change_type,
        change.previous_price_id,
        change.previous_plan_id,
        change.current_price_id,
        change.current_plan_id
    );
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingChangeHandler;

impl SubscriptionChangeHandler for LoggingChangeHandler {}

pub async fn route_change(
    handler: &dyn SubscriptionChangeHandler,
    user_id: Uuid,
    subscription_id: &str,
    change: &SubscriptionChange,
) -> AppResult<()> {
    match change.change_type {
        SubscriptionChangeType::MonthlyToMonthlyUpgrade => handler.monthly_upgrade(user_id, subscription_id, change).await,
        SubscriptionChangeType::MonthlyToMonthlyDowngrade => {
            handler.monthly_downgrade(user_id, subscription_id, change).await
        }
        SubscriptionChangeType::YearlyToYearlyUpgrade => handler.yearly_upgrade(user_id, subscription_id, change).await,
        SubscriptionChangeType::YearlyToYearlyDowngrade => handler.yearly_downgrade(user_id, subscription_id, change).await,
        SubscriptionChangeType::MonthlyToYearlyChange => handler.monthly_to_yearly(user_id, subscription_id, change).await,
        SubscriptionChangeType::YearlyToMonthlyChange => handler.yearly_to_monthly(user_id, subscription_id, change).await,
        SubscriptionChangeType::None => {
            info!("No subscription change detected for subscription {}", subscription_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryPlanStore;
    use serde_json::json;
    use std::sync::Mutex;

    fn d(v: i64) -> BigDecimal {
        BigDecimal::from(v)
    }

    #[test]
    fn classification_covers_every_case() {
        use BillingInterval::{Monthly, Yearly};
        use SubscriptionChangeType::*;

        assert_eq!(classify_change(Monthly, Monthly, &d(10), &d(20)), MonthlyToMonthlyUpgrade);
        assert_eq!(classify_change(Monthly, Monthly, &d(20), &d(10)), MonthlyToMonthlyDowngrade);
        assert_eq!(classify_change(Yearly, Yearly, &d(100), &d(200)), YearlyToYearlyUpgrade);
        assert_eq!(classify_change(Yearly, Yearly, &d(200), &d(100)), YearlyToYearlyDowngrade);
        assert_eq!(classify_change(Monthly, Yearly, &d(10), &d(10)), MonthlyToYearlyChange);
        assert_eq!(classify_change(Yearly, Monthly, &d(100), &d(10)), YearlyToMonthlyChange);
        assert_eq!(classify_change(Monthly, Monthly, &d(10), &d(10)), None);
    }

    fn plan(id: u128, price_id: &str, interval: &str, price: i64) -> PricingPlan {
        PricingPlan {
            id: Uuid::from_u128(id),
            card_title: price_id.to_string(),
            stripe_price_id: Some(price_id.to_string()),
            stripe_product_id: None,
            creem_product_id: None,
            payment_type: Some("recurring".to_string()),
            recurring_interval: Some(interval.to_string()),
            price: Some(d(price)),
            currency: Some("usd".to_string()),
            benefits_jsonb: json!({}),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn detector_looks_up_both_plans() {
        let detector = SubscriptionChangeDetector::new(Arc::new(MemoryPlanStore::new(vec![
            plan(1, "price_basic", "month", 10),
            plan(2, "price_pro", "month", 30),
        ])));

        let change = detector.detect("price_basic", "price_pro").await.unwrap();
        assert_eq!(change.change_type, SubscriptionChangeType::MonthlyToMonthlyUpgrade);
        assert_eq!(change.current_plan_id, Some(Uuid::from_u128(2)));

        let unknown = detector.detect("price_basic", "price_gone").await.unwrap();
        assert_eq!(unknown.change_type, SubscriptionChangeType::None);
    }

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl SubscriptionChangeHandler for Recording {
        async fn yearly_downgrade(&self, _: Uuid, _: &str, _: &SubscriptionChange) -> AppResult<()> {
            self.seen.lock().unwrap().push("yearly_downgrade");
            Ok(())
        }
    }

    #[tokio::test]
    async fn routing_dispatches_to_matching_hook() {
        let handler = Recording::default();
        let mut change = SubscriptionChange::unchanged("a", "b");
        change.change_type = SubscriptionChangeType::YearlyToYearlyDowngrade;

        route_change(&handler, Uuid::nil(), "sub_1", &change).await.unwrap();
        change.change_type = SubscriptionChangeType::MonthlyToMonthlyUpgrade;
        route_change(&handler, Uuid::nil(), "sub_1", &change).await.unwrap();

        assert_eq!(*handler.seen.lock().unwrap(), vec!["yearly_downgrade"]);
    }
}
