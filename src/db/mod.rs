pub mod balance;
pub mod connection;
pub mod memory;
pub mod pool_ext;
pub mod repositories;
pub mod stores;

pub use connection::{create_pool, run_migrations, verify_connection};
pub use repositories::*;
pub use stores::{CreditStore, OrderStore, PlanStore, SubscriptionStore, UserDirectory};
