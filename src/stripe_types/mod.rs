//! Stripe API payload types, limited to the fields the ledger reads.

pub mod charge;
pub mod checkout_session;
pub mod customer;
pub mod enums;
pub mod event;
pub mod expandable;
pub mod invoice;
pub mod list;
pub mod payment_intent;
pub mod price;
pub mod refund;
pub mod subscription;

pub use charge::Charge;
pub use checkout_session::{CheckoutSession, TotalDetails};
pub use customer::Customer;
pub use enums::*;
pub use event::{Event, EventData};
pub use expandable::{Expandable, StripeObject};
pub use invoice::{Invoice, InvoicePayment, InvoicePaymentDetails};
pub use list::List;
pub use payment_intent::PaymentIntent;
pub use price::{Price, PriceRecurring, Product};
pub use refund::{EarlyFraudWarning, Refund};
pub use subscription::{Subscription, SubscriptionItem};
