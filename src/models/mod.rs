pub mod auth_jwt_claims;
pub mod authenticated_user;
pub mod credit_log;
pub mod order;
pub mod pricing_plan;
pub mod subscription;
pub mod usage;

pub use auth_jwt_claims::Claims;
pub use authenticated_user::AuthenticatedUser;
pub use credit_log::{BalanceKind, CreditLog, CreditLogType, NewCreditLog};
pub use order::{NewOrder, Order, OrderType, PaymentProvider, RefundReference};
pub use pricing_plan::{BillingInterval, PlanBenefits, PricingPlan};
pub use subscription::{SubscriptionRecord, SubscriptionUpsert};
pub use usage::{AllocationState, MonthlyAllocation, Usage, YearlyAllocation};

/// Stores a string-like enum in a Postgres TEXT column through its
/// `as_str()` / `FromStr` pair.
macro_rules! impl_text_column {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                Ok(raw.parse::<$ty>()?)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }
    };
}

pub(crate) use impl_text_column;
