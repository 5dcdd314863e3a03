pub mod order_repository;
pub mod pricing_plan_repository;
pub mod subscription_repository;
pub mod usage_repository;
pub mod user_repository;

pub use order_repository::OrderRepository;
pub use pricing_plan_repository::PricingPlanRepository;
pub use subscription_repository::SubscriptionRepository;
pub use usage_repository::UsageRepository;
pub use user_repository::UserRepository;
