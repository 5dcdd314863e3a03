pub mod credit_manager;
pub mod creem_webhook_processor;
pub mod fraud_responder;
pub mod ledger_services;
pub mod notification_service;
pub mod order_ledger;
pub mod payment_verification;
pub mod retry_policy;
pub mod stripe_webhook_processor;
pub mod subscription_change;
pub mod subscription_sync;
pub mod yearly_allocation_job;

// Re-export commonly used types
pub use credit_manager::CreditManager;
pub use creem_webhook_processor::CreemWebhookProcessor;
pub use ledger_services::LedgerServices;
pub use order_ledger::OrderLedger;
pub use payment_verification::PaymentVerifier;
pub use stripe_webhook_processor::StripeWebhookProcessor;
pub use subscription_sync::SubscriptionSynchronizer;
