//! Payment ledger server library
//!
//! Reconciles Stripe and Creem webhooks into an order ledger and a per-user
//! credit balance. The `server` binary wires these modules into actix-web.

pub mod app_state;
pub mod config;
pub mod creem_types;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod providers;
pub mod routes;
pub mod services;
pub mod stripe_types;
pub mod utils;

// Re-export commonly used types for convenience
pub use app_state::AppState;
pub use config::AppSettings;
pub use error::AppError;
