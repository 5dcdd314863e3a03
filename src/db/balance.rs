//! Balance arithmetic shared by every `CreditStore` implementation.
//!
//! A store loads the usage row (under a row lock for Postgres), asks
//! [`plan_change`] what the row should become, then writes the new row and
//! its audit entry in the same transaction.

use chrono::{Datelike, NaiveDate};
use uuid::Uuid;

use crate::models::{
    AllocationState, BalanceKind, BillingInterval, CreditLogType, NewCreditLog, Usage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceMutation {
    /// Adds to the one-time balance.
    GrantOneTime { credits: i32 },
    /// Sets the subscription balance and replaces the allocation state.
    ResetSubscription { credits: i32, allocation: AllocationState },
    /// Removes up to `credits` from the one-time balance.
    RevokeOneTime { credits: i32 },
    /// Removes the current allocation's monthly credits if it matches `interval`.
    RevokeAllocation { interval: BillingInterval },
    /// Forfeits the whole subscription balance.
    RevokeEntireSubscription,
    /// Credits the next month of a yearly allocation if it is due.
    AllocateYearlyMonth { today: NaiveDate },
}

impl BalanceMutation {
    /// Grants create the usage row on first use; revocations never do.
    pub fn creates_row(&self) -> bool {
        matches!(
            self,
            BalanceMutation::GrantOneTime { .. } | BalanceMutation::ResetSubscription { .. }
        )
    }

    pub fn log_type(&self) -> CreditLogType {
        match self {
            BalanceMutation::GrantOneTime { .. } => CreditLogType::OneTimePurchase,
            BalanceMutation::ResetSubscription { .. } | BalanceMutation::AllocateYearlyMonth { .. } => {
                CreditLogType::SubscriptionGrant
            }
            BalanceMutation::RevokeOneTime { .. } | BalanceMutation::RevokeAllocation { .. } => {
                CreditLogType::RefundRevoke
            }
            BalanceMutation::RevokeEntireSubscription => CreditLogType::SubscriptionEndedRevoke,
        }
    }

    pub fn balance_kind(&self) -> BalanceKind {
        match self {
            BalanceMutation::GrantOneTime { .. } | BalanceMutation::RevokeOneTime { .. } => {
                BalanceKind::OneTime
            }
            _ => BalanceKind::Subscription,
        }
    }
}

/// Free-text context recorded with the audit row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerNote {
    pub notes: Option<String>,
    pub related_order_id: Option<Uuid>,
    /// Skip the mutation when the order already has an audit row of the same type.
    pub once_per_order: bool,
}

impl LedgerNote {
    pub fn new(notes: impl Into<String>, related_order_id: Option<Uuid>) -> Self {
        Self {
            notes: Some(notes.into()),
            related_order_id,
            once_per_order: false,
        }
    }

    /// Marks the mutation as applying at most once for its related order.
    pub fn once_per_order(mut self) -> Self {
        self.once_per_order = true;
        self
    }

    /// The order whose existing audit rows must be checked before applying.
    pub fn guarded_order(&self) -> Option<Uuid> {
        self.related_order_id.filter(|_| self.once_per_order)
    }
}

/// The row to write back and, when a counter moved or a grant happened, its audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    pub usage: Usage,
    pub log: Option<NewCreditLog>,
}

/// Computes the effect of `mutation` on `current`.
///
/// Returns `None` when nothing needs to be written. Balances never go below
/// zero; revocations log the amount actually removed, and subscription resets
/// log the difference from the previous balance so the audit trail always sums
/// to the live counters.
pub fn plan_change(
    user_id: Uuid,
    current: Option<&Usage>,
    mutation: &BalanceMutation,
    note: &LedgerNote,
) -> Option<BalanceChange> {
    let before = match current {
        Some(usage) => usage.clone(),
        None if mutation.creates_row() => Usage::empty(user_id),
        None => return None,
    };
    let mut after = before.clone();

    let delta = match mutation {
        BalanceMutation::GrantOneTime { credits } => {
            if *credits <= 0 {
                return None;
            }
            after.one_time_credits_balance = before.one_time_credits_balance.saturating_add(*credits);
            after.one_time_credits_balance - before.one_time_credits_balance
        }
        BalanceMutation::ResetSubscription { credits, allocation } => {
            after.subscription_credits_balance = (*credits).max(0);
            after.allocation = allocation.clone();
            // A reset is always recorded, even when the balance did not move.
            return Some(BalanceChange {
                log: Some(audit_row(
                    user_id,
                    after.subscription_credits_balance - before.subscription_credits_balance,
                    &after,
                    mutation,
                    note,
                )),
                usage: after,
            });
        }
        BalanceMutation::RevokeOneTime { credits } => {
            after.one_time_credits_balance = clamp_sub(before.one_time_credits_balance, *credits);
            after.one_time_credits_balance - before.one_time_credits_balance
        }
        BalanceMutation::RevokeAllocation { interval } => {
            let nominal = match (interval, &before.allocation) {
                (BillingInterval::Monthly, AllocationState::Monthly(m)) => m.monthly_credits,
                (BillingInterval::Yearly, AllocationState::Yearly(y)) => y.monthly_credits,
                _ => return None,
            };
            after.subscription_credits_balance = clamp_sub(before.subscription_credits_balance, nominal);
            after.allocation = AllocationState::None;
            after.subscription_credits_balance - before.subscription_credits_balance
        }
        BalanceMutation::RevokeEntireSubscription => {
            after.subscription_credits_balance = 0;
            after.allocation = AllocationState::None;
            -before.subscription_credits_balance
        }
        BalanceMutation::AllocateYearlyMonth { today } => {
            let AllocationState::Yearly(yearly) = &before.allocation else {
                return None;
            };
            let month = month_key(*today);
            if yearly.remaining_months <= 0
                || yearly.next_credit_date > *today
                || yearly.last_allocated_month == month
            {
                return None;
            }
            let mut next = yearly.clone();
            next.remaining_months -= 1;
            next.next_credit_date = first_of_next_month(*today);
            next.last_allocated_month = month;
            after.subscription_credits_balance = yearly.monthly_credits.max(0);
            after.allocation = AllocationState::Yearly(next);
            // Allocations are grants and are always recorded.
            return Some(BalanceChange {
                log: Some(audit_row(
                    user_id,
                    after.subscription_credits_balance - before.subscription_credits_balance,
                    &after,
                    mutation,
                    note,
                )),
                usage: after,
            });
        }
    };

    if delta == 0 {
        if after == before {
            return None;
        }
        // Allocation cleared on an already-empty balance.
        return Some(BalanceChange { usage: after, log: None });
    }

    Some(BalanceChange {
        log: Some(audit_row(user_id, delta, &after, mutation, note)),
        usage: after,
    })
}

fn clamp_sub(balance: i32, amount: i32) -> i32 {
    balance.saturating_sub(amount.max(0)).max(0)
}

fn audit_row(
    user_id: Uuid,
    amount: i32,
    after: &Usage,
    mutation: &BalanceMutation,
    note: &LedgerNote,
) -> NewCreditLog {
    NewCreditLog {
        user_id,
        amount,
        balance_kind: mutation.balance_kind(),
        one_time_balance_after: after.one_time_credits_balance,
        subscription_balance_after: after.subscription_credits_balance,
        log_type: mutation.log_type(),
        notes: note.notes.clone(),
        related_order_id: note.related_order_id,
    }
}

/// `YYYY-MM` for the month containing `date`.
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

pub fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MonthlyAllocation, YearlyAllocation};
    use pretty_assertions::assert_eq;

    fn user() -> Uuid {
        Uuid::from_u128(7)
    }

    fn usage(one_time: i32, subscription: i32, allocation: AllocationState) -> Usage {
        Usage {
            user_id: user(),
            subscription_credits_balance: subscription,
            one_time_credits_balance: one_time,
            allocation,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn one_time_grant_creates_missing_row() {
        let change = plan_change(
            user(),
            None,
            &BalanceMutation::GrantOneTime { credits: 500 },
            &LedgerNote::default(),
        )
        .unwrap();
        assert_eq!(change.usage.one_time_credits_balance, 500);
        let log = change.log.unwrap();
        assert_eq!(log.amount, 500);
        assert_eq!(log.log_type, CreditLogType::OneTimePurchase);
        assert_eq!(log.balance_kind, BalanceKind::OneTime);
    }

    #[test]
    fn revocation_without_usage_row_is_a_no_op() {
        let change = plan_change(
            user(),
            None,
            &BalanceMutation::RevokeOneTime { credits: 10 },
            &LedgerNote::default(),
        );
        assert_eq!(change, None);
    }

    #[test]
    fn revocation_clamps_and_logs_actual_amount() {
        let current = usage(120, 0, AllocationState::None);
        let change = plan_change(
            user(),
            Some(&current),
            &BalanceMutation::RevokeOneTime { credits: 500 },
            &LedgerNote::default(),
        )
        .unwrap();
        assert_eq!(change.usage.one_time_credits_balance, 0);
        assert_eq!(change.log.unwrap().amount, -120);
    }

    #[test]
    fn subscription_reset_logs_delta() {
        let monthly = AllocationState::Monthly(MonthlyAllocation {
            monthly_credits: 300,
            related_order_id: None,
        });
        let current = usage(0, 250, monthly.clone());
        let change = plan_change(
            user(),
            Some(&current),
            &BalanceMutation::ResetSubscription { credits: 300, allocation: monthly },
            &LedgerNote::default(),
        )
        .unwrap();
        assert_eq!(change.usage.subscription_credits_balance, 300);
        assert_eq!(change.log.unwrap().amount, 50);
    }

    #[test]
    fn allocation_revoke_ignores_mismatched_interval() {
        let current = usage(
            0,
            300,
            AllocationState::Monthly(MonthlyAllocation { monthly_credits: 300, related_order_id: None }),
        );
        let change = plan_change(
            user(),
            Some(&current),
            &BalanceMutation::RevokeAllocation { interval: BillingInterval::Yearly },
            &LedgerNote::default(),
        );
        assert_eq!(change, None);
    }

    #[test]
    fn ending_subscription_clears_allocation_even_when_balance_is_spent() {
        let current = usage(
            5,
            0,
            AllocationState::Monthly(MonthlyAllocation { monthly_credits: 300, related_order_id: None }),
        );
        let change = plan_change(
            user(),
            Some(&current),
            &BalanceMutation::RevokeEntireSubscription,
            &LedgerNote::default(),
        )
        .unwrap();
        assert!(change.usage.allocation.is_none());
        assert_eq!(change.log, None);
    }

    #[test]
    fn yearly_allocation_runs_once_per_month() {
        let yearly = AllocationState::Yearly(YearlyAllocation {
            remaining_months: 11,
            next_credit_date: date(2026, 2, 1),
            monthly_credits: 100,
            last_allocated_month: "2026-01".to_string(),
            related_order_id: None,
        });
        let current = usage(0, 40, yearly);
        let mutation = BalanceMutation::AllocateYearlyMonth { today: date(2026, 2, 1) };

        let change = plan_change(user(), Some(&current), &mutation, &LedgerNote::default()).unwrap();
        assert_eq!(change.usage.subscription_credits_balance, 100);
        assert_eq!(change.log.as_ref().unwrap().amount, 60);
        let AllocationState::Yearly(next) = &change.usage.allocation else {
            panic!("expected yearly allocation");
        };
        assert_eq!(next.remaining_months, 10);
        assert_eq!(next.next_credit_date, date(2026, 3, 1));
        assert_eq!(next.last_allocated_month, "2026-02");

        let again = plan_change(user(), Some(&change.usage), &mutation, &LedgerNote::default());
        assert_eq!(again, None);
    }

    #[test]
    fn next_month_wraps_year() {
        assert_eq!(first_of_next_month(date(2025, 12, 31)), date(2026, 1, 1));
        assert_eq!(month_key(date(2026, 3, 9)), "2026-03");
    }
}
