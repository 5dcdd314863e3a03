// Stripe enum constants used when dispatching and interpreting webhook payloads

// Checkout Session Statuses
pub const CHECKOUT_SESSION_STATUS_COMPLETE: &str = "complete";

// Checkout Session Modes
pub const CHECKOUT_SESSION_MODE_PAYMENT: &str = "payment";
pub const CHECKOUT_SESSION_MODE_SUBSCRIPTION: &str = "subscription";

// Invoice
pub const INVOICE_STATUS_PAID: &str = "paid";
pub const BILLING_REASON_SUBSCRIPTION_CREATE: &str = "subscription_create";

// Webhook Event Types
pub const EVENT_CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const EVENT_INVOICE_PAID: &str = "invoice.paid";
pub const EVENT_INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";
pub const EVENT_SUBSCRIPTION_CREATED: &str = "customer.subscription.created";
pub const EVENT_SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const EVENT_SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const EVENT_CHARGE_REFUNDED: &str = "charge.refunded";
pub const EVENT_EARLY_FRAUD_WARNING_CREATED: &str = "radar.early_fraud_warning.created";
