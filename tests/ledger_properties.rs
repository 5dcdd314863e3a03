use chrono::NaiveDate;
use proptest::prelude::*;
use tokio_test::block_on;
use uuid::Uuid;

use payment_ledger_server::db::balance::{BalanceMutation, LedgerNote};
use payment_ledger_server::db::memory::MemoryCreditStore;
use payment_ledger_server::db::CreditStore;
use payment_ledger_server::models::{
    AllocationState, BalanceKind, BillingInterval, MonthlyAllocation, YearlyAllocation,
};
use payment_ledger_server::services::order_ledger::refund_status;
use payment_ledger_server::utils::currency::{is_full_refund, to_currency_amount, to_minor_units};

fn date(day_offset: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Days::new(day_offset as u64)
}

fn mutation() -> impl Strategy<Value = BalanceMutation> {
    prop_oneof![
        (-50..2_000i32).prop_map(|credits| BalanceMutation::GrantOneTime { credits }),
        (-50..2_000i32).prop_map(|credits| BalanceMutation::RevokeOneTime { credits }),
        (0..1_000i32).prop_map(|credits| BalanceMutation::ResetSubscription {
            credits,
            allocation: AllocationState::Monthly(MonthlyAllocation {
                monthly_credits: credits,
                related_order_id: None,
            }),
        }),
        (1..1_000i32, 1..12i32, 0..365u32).prop_map(|(credits, months, offset)| {
            let start = date(offset);
            BalanceMutation::ResetSubscription {
                credits,
                allocation: AllocationState::Yearly(YearlyAllocation {
                    remaining_months: months,
                    next_credit_date: start,
                    monthly_credits: credits,
                    last_allocated_month: "2025-12".to_string(),
                    related_order_id: None,
                }),
            }
        }),
        prop_oneof![Just(BillingInterval::Monthly), Just(BillingInterval::Yearly)]
            .prop_map(|interval| BalanceMutation::RevokeAllocation { interval }),
        Just(BalanceMutation::RevokeEntireSubscription),
        (0..400u32).prop_map(|offset| BalanceMutation::AllocateYearlyMonth { today: date(offset) }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn balances_stay_non_negative_and_match_the_audit_trail(
        mutations in prop::collection::vec(mutation(), 1..40)
    ) {
        let user = Uuid::from_u128(42);
        let store = MemoryCreditStore::new();

        block_on(async {
            for m in mutations {
                store.apply(user, m, LedgerNote::default()).await.unwrap();
            }
        });

        let usage = block_on(store.get_usage(user)).unwrap();
        let logs = block_on(store.list_logs(user)).unwrap();

        let (one_time, subscription) = usage
            .map(|u| (u.one_time_credits_balance, u.subscription_credits_balance))
            .unwrap_or((0, 0));
        prop_assert!(one_time >= 0);
        prop_assert!(subscription >= 0);

        let logged = |kind: BalanceKind| -> i64 {
            logs.iter().filter(|l| l.balance_kind == kind).map(|l| l.amount as i64).sum()
        };
        prop_assert_eq!(logged(BalanceKind::OneTime), one_time as i64);
        prop_assert_eq!(logged(BalanceKind::Subscription), subscription as i64);

        if let Some(last) = logs.last() {
            prop_assert_eq!(last.one_time_balance_after, one_time);
            prop_assert_eq!(last.subscription_balance_after, subscription);
        }
    }

    #[test]
    fn minor_units_survive_the_decimal_column(amount in -10_000_000i64..10_000_000) {
        prop_assert_eq!(to_minor_units(&to_currency_amount(Some(amount))), amount);
        prop_assert!(is_full_refund(amount.abs(), &to_currency_amount(Some(amount.abs()))));
    }

    #[test]
    fn only_an_exact_refund_marks_an_order_refunded(total in 1i64..1_000_000, refunded in 1i64..1_000_000) {
        let status = refund_status(refunded, total);
        if refunded == total {
            prop_assert_eq!(status, "refunded");
        } else {
            prop_assert_eq!(status, "partially_refunded");
        }
    }
}
