#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::web;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use uuid::Uuid;

use payment_ledger_server::app_state::{AppState, LedgerStores, ProviderApis};
use payment_ledger_server::config::settings::{
    AppConfig, AuthConfig, BillingConfig, CreemConfig, DatabaseConfig, NotificationConfig, ServerConfig,
    StripeConfig,
};
use payment_ledger_server::config::{AppSettings, FraudPolicy};
use payment_ledger_server::creem_types::{CreemCheckout, CreemCustomer, CreemDiscount, CreemProduct, CreemSubscription};
use payment_ledger_server::creem_types::CreemEvent;
use payment_ledger_server::db::balance::{BalanceMutation, LedgerNote};
use payment_ledger_server::db::CreditStore;
use payment_ledger_server::db::memory::{
    MemoryCreditStore, MemoryOrderStore, MemoryPlanStore, MemorySubscriptionStore, MemoryUserDirectory,
};
use payment_ledger_server::error::AppError;
use payment_ledger_server::models::{CreditLog, CreditLogType, PricingPlan, Usage};
use payment_ledger_server::providers::{CreemApi, StripeApi};
use payment_ledger_server::services::notification_service::{
    CreditUpgradeFailure, FraudRefundNotice, FraudWarningReport, InvoicePaymentFailedNotice, Notifier,
};
use payment_ledger_server::services::retry_policy::RetryPolicy;
use payment_ledger_server::stripe_types::{CheckoutSession, Charge, Customer, Event, Refund, Subscription};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test";
pub const CREEM_WEBHOOK_SECRET: &str = "creem_whsec_test";

pub const USER: Uuid = Uuid::from_u128(0x1111);
pub const OTHER_USER: Uuid = Uuid::from_u128(0x2222);

pub const ONE_TIME_PLAN: Uuid = Uuid::from_u128(1);
pub const YEARLY_PLAN: Uuid = Uuid::from_u128(2);
pub const MONTHLY_PLAN: Uuid = Uuid::from_u128(3);

fn parse<T: DeserializeOwned>(value: Value) -> T {
    serde_json::from_value(value).expect("fixture should deserialize")
}

fn missing(kind: &str, id: &str) -> AppError {
    AppError::NotFound(format!("No such {}: '{}'", kind, id))
}

/// Stripe API backed by in-memory fixtures.
#[derive(Default)]
pub struct FakeStripe {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    charges: Mutex<HashMap<String, Charge>>,
    pub refunded_charges: Mutex<Vec<String>>,
}

impl FakeStripe {
    pub fn put_session(&self, session: Value) {
        let session: CheckoutSession = parse(session);
        self.sessions.lock().unwrap().insert(session.id.clone(), session);
    }

    pub fn put_subscription(&self, subscription: Value) {
        let subscription: Subscription = parse(subscription);
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
    }

    pub fn put_charge(&self, charge: Value) {
        let charge: Charge = parse(charge);
        self.charges.lock().unwrap().insert(charge.id.clone(), charge);
    }
}

#[async_trait]
impl StripeApi for FakeStripe {
    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, AppError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| missing("checkout.session", session_id))
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription, AppError> {
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| missing("subscription", subscription_id))
    }

    // Every customer exists but none carries a userId in its metadata.
    async fn retrieve_customer(&self, customer_id: &str) -> Result<Customer, AppError> {
        Ok(parse(json!({ "id": customer_id, "metadata": {} })))
    }

    async fn retrieve_charge(&self, charge_id: &str) -> Result<Charge, AppError> {
        self.charges
            .lock()
            .unwrap()
            .get(charge_id)
            .cloned()
            .ok_or_else(|| missing("charge", charge_id))
    }

    async fn invoice_payment_intent(&self, _invoice_id: &str) -> Result<Option<String>, AppError> {
        Ok(None)
    }

    async fn create_refund(&self, charge_id: &str, reason: &str) -> Result<Refund, AppError> {
        self.refunded_charges.lock().unwrap().push(charge_id.to_string());
        Ok(parse(json!({
            "id": format!("re_{}", charge_id),
            "charge": charge_id,
            "reason": reason,
            "status": "succeeded"
        })))
    }

    async fn list_customer_subscriptions(
        &self,
        customer_id: &str,
        _limit: u32,
    ) -> Result<Vec<Subscription>, AppError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.customer.id() == customer_id)
            .cloned()
            .collect())
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<Subscription, AppError> {
        Err(missing("subscription", subscription_id))
    }
}

/// Creem API backed by in-memory fixtures.
#[derive(Default)]
pub struct FakeCreem {
    checkouts: Mutex<HashMap<String, CreemCheckout>>,
    subscriptions: Mutex<HashMap<String, CreemSubscription>>,
}

impl FakeCreem {
    pub fn put_checkout(&self, checkout: Value) {
        let checkout: CreemCheckout = parse(checkout);
        self.checkouts.lock().unwrap().insert(checkout.id.clone(), checkout);
    }

    pub fn put_subscription(&self, subscription: Value) {
        let subscription: CreemSubscription = parse(subscription);
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
    }
}

#[async_trait]
impl CreemApi for FakeCreem {
    async fn retrieve_checkout(&self, checkout_id: &str) -> Result<CreemCheckout, AppError> {
        self.checkouts
            .lock()
            .unwrap()
            .get(checkout_id)
            .cloned()
            .ok_or_else(|| missing("checkout", checkout_id))
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<CreemSubscription, AppError> {
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| missing("subscription", subscription_id))
    }

    async fn retrieve_product(&self, product_id: &str) -> Result<CreemProduct, AppError> {
        Err(missing("product", product_id))
    }

    async fn retrieve_customer(
        &self,
        _email: Option<&str>,
        customer_id: Option<&str>,
    ) -> Result<CreemCustomer, AppError> {
        Err(missing("customer", customer_id.unwrap_or_default()))
    }

    async fn create_customer_portal_link(&self, customer_id: &str) -> Result<String, AppError> {
        Err(missing("customer", customer_id))
    }

    async fn retrieve_discount(
        &self,
        discount_id: Option<&str>,
        _discount_code: Option<&str>,
    ) -> Result<CreemDiscount, AppError> {
        Err(missing("discount", discount_id.unwrap_or_default()))
    }
}

/// Memory credit store whose next `apply` calls fail like a dropped connection.
pub struct FlakyCreditStore {
    inner: Arc<MemoryCreditStore>,
    failures_left: AtomicU32,
}

impl FlakyCreditStore {
    pub fn new(inner: Arc<MemoryCreditStore>) -> Self {
        Self {
            inner,
            failures_left: AtomicU32::new(0),
        }
    }

    /// Fails the next `count` balance mutations.
    pub fn fail_next_applies(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl CreditStore for FlakyCreditStore {
    async fn get_usage(&self, user_id: Uuid) -> Result<Option<Usage>, AppError> {
        self.inner.get_usage(user_id).await
    }

    async fn apply(
        &self,
        user_id: Uuid,
        mutation: BalanceMutation,
        note: LedgerNote,
    ) -> Result<Option<CreditLog>, AppError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::Database("connection reset by peer".to_string()));
        }
        self.inner.apply(user_id, mutation, note).await
    }

    async fn list_logs(&self, user_id: Uuid) -> Result<Vec<CreditLog>, AppError> {
        self.inner.list_logs(user_id).await
    }

    async fn has_log_for_order(&self, order_id: Uuid, log_type: CreditLogType) -> Result<bool, AppError> {
        self.inner.has_log_for_order(order_id, log_type).await
    }

    async fn users_with_due_yearly_allocation(&self, today: NaiveDate) -> Result<Vec<Uuid>, AppError> {
        self.inner.users_with_due_yearly_allocation(today).await
    }
}

/// Remembers which notifications were sent.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Records every attempt but reports each one as a delivery failure.
    pub fn fail_deliveries(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn record(&self, kind: String) {
        self.sent.lock().unwrap().push(kind);
    }

    fn outcome(&self) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::External("mailgun returned 503".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn credit_upgrade_failed(&self, failure: &CreditUpgradeFailure) -> Result<(), AppError> {
        self.record(format!("credit_upgrade_failed:{}", failure.order_id));
        self.outcome()
    }

    async fn invoice_payment_failed(&self, notice: &InvoicePaymentFailedNotice) -> Result<(), AppError> {
        self.record(format!("invoice_payment_failed:{}", notice.invoice_id));
        Ok(())
    }

    async fn fraud_warning_admin(&self, report: &FraudWarningReport) -> Result<(), AppError> {
        self.record(format!("fraud_warning_admin:{}", report.charge_id));
        Ok(())
    }

    async fn fraud_refund_user(&self, notice: &FraudRefundNotice) -> Result<(), AppError> {
        self.record(format!("fraud_refund_user:{}", notice.charge_id));
        Ok(())
    }
}

pub fn settings() -> AppSettings {
    AppSettings {
        app: AppConfig {
            name: "payment-ledger-test".to_string(),
            environment: "test".to_string(),
        },
        database: DatabaseConfig {
            url: "postgres://localhost/unused".to_string(),
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
        },
        auth: AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
        },
        stripe: Some(StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: STRIPE_WEBHOOK_SECRET.to_string(),
            api_base_url: "http://127.0.0.1:9".to_string(),
            fraud_policy: FraudPolicy { refund: true, email: true },
        }),
        creem: Some(CreemConfig {
            api_key: "creem_test".to_string(),
            webhook_secret: CREEM_WEBHOOK_SECRET.to_string(),
            api_base_url: "http://127.0.0.1:9".to_string(),
        }),
        notifications: NotificationConfig {
            mailgun_api_key: None,
            mailgun_domain: None,
            mailgun_base_url: "https://api.mailgun.net".to_string(),
            from_email: "billing@example.com".to_string(),
            admin_email: None,
        },
        billing: BillingConfig {
            default_currency: "usd".to_string(),
            credit_retry_attempts: 3,
            yearly_allocation_cron: "0 10 0 * * *".to_string(),
        },
    }
}

pub fn plan(id: Uuid, interval: Option<&str>, benefits: Value) -> PricingPlan {
    let n = id.as_u128();
    PricingPlan {
        id,
        card_title: format!("Plan {}", n),
        stripe_price_id: Some(format!("price_{}", n)),
        stripe_product_id: Some(format!("prod_{}", n)),
        creem_product_id: Some(format!("creem_prod_{}", n)),
        payment_type: Some(if interval.is_some() { "recurring" } else { "one_time" }.to_string()),
        recurring_interval: interval.map(str::to_string),
        price: Some(BigDecimal::from(10)),
        currency: Some("usd".to_string()),
        benefits_jsonb: benefits,
        is_active: true,
    }
}

pub fn default_plans() -> Vec<PricingPlan> {
    vec![
        plan(ONE_TIME_PLAN, None, json!({ "oneTimeCredits": 500 })),
        plan(YEARLY_PLAN, Some("year"), json!({ "monthlyCredits": 100, "totalMonths": 12 })),
        plan(MONTHLY_PLAN, Some("month"), json!({ "monthlyCredits": 300 })),
    ]
}

/// The full service graph on in-memory stores and fake provider APIs.
pub struct Harness {
    pub settings: AppSettings,
    pub orders: Arc<MemoryOrderStore>,
    pub credits: Arc<MemoryCreditStore>,
    pub flaky_credits: Arc<FlakyCreditStore>,
    pub subscriptions: Arc<MemorySubscriptionStore>,
    pub users: Arc<MemoryUserDirectory>,
    pub stripe: Arc<FakeStripe>,
    pub creem: Arc<FakeCreem>,
    pub notifier: Arc<RecordingNotifier>,
    pub state: web::Data<AppState>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(settings())
    }

    pub fn with_settings(settings: AppSettings) -> Self {
        let orders = Arc::new(MemoryOrderStore::new());
        let credits = Arc::new(MemoryCreditStore::new());
        let flaky_credits = Arc::new(FlakyCreditStore::new(credits.clone()));
        let subscriptions = Arc::new(MemorySubscriptionStore::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let stripe = Arc::new(FakeStripe::default());
        let creem = Arc::new(FakeCreem::default());
        let notifier = Arc::new(RecordingNotifier::default());

        users.add_user(USER, "buyer@example.com", Some("cus_1"));

        let stores = LedgerStores {
            orders: orders.clone(),
            credits: flaky_credits.clone(),
            plans: Arc::new(MemoryPlanStore::new(default_plans())),
            subscriptions: subscriptions.clone(),
            users: users.clone(),
        };
        let apis = ProviderApis {
            stripe: Some(stripe.clone() as Arc<dyn StripeApi>),
            creem: Some(creem.clone() as Arc<dyn CreemApi>),
        };
        let state = AppState::build(
            &settings,
            stores,
            apis,
            notifier.clone(),
            RetryPolicy::new(3, Duration::ZERO),
        );

        Self {
            settings,
            orders,
            credits,
            flaky_credits,
            subscriptions,
            users,
            stripe,
            creem,
            notifier,
            state: web::Data::new(state),
        }
    }

    pub async fn stripe(&self, event: &Event) -> Result<(), AppError> {
        self.state
            .stripe
            .as_ref()
            .expect("stripe configured")
            .processor
            .process(event)
            .await
    }

    pub async fn creem(&self, event: &CreemEvent) -> Result<(), AppError> {
        self.state
            .creem
            .as_ref()
            .expect("creem configured")
            .processor
            .process(event)
            .await
    }
}

pub fn stripe_event(event_type: &str, object: Value) -> Event {
    parse(json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "created": 1_773_100_800,
        "data": { "object": object }
    }))
}

pub fn stripe_update_event(object: Value, previous_attributes: Value) -> Event {
    parse(json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": "customer.subscription.updated",
        "data": { "object": object, "previous_attributes": previous_attributes }
    }))
}

pub fn creem_event(event_type: &str, object: Value) -> CreemEvent {
    parse(json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "eventType": event_type,
        "created_at": 1_773_100_800_000_i64,
        "object": object
    }))
}

/// A paid one-time Stripe checkout for `user` buying the one-time plan.
pub fn one_time_checkout(user: Uuid) -> Value {
    json!({
        "id": "cs_test_1",
        "mode": "payment",
        "status": "complete",
        "payment_status": "paid",
        "customer": "cus_1",
        "payment_intent": "pi_1",
        "currency": "usd",
        "amount_subtotal": 1000,
        "amount_total": 1000,
        "total_details": { "amount_discount": 0, "amount_tax": 0 },
        "metadata": {
            "userId": user.to_string(),
            "planId": ONE_TIME_PLAN.to_string(),
            "priceId": "price_1"
        }
    })
}

/// 2026-03-10T00:00:00Z
pub const PERIOD_START: i64 = 1_773_100_800;

pub fn stripe_subscription(id: &str, price_id: &str, interval: &str, status: &str) -> Value {
    json!({
        "id": id,
        "customer": "cus_1",
        "status": status,
        "cancel_at_period_end": false,
        "items": { "data": [{
            "id": format!("si_{}", id),
            "price": {
                "id": price_id,
                "product": format!("prod_for_{}", price_id),
                "unit_amount": 1000,
                "currency": "usd",
                "recurring": { "interval": interval, "interval_count": 1 }
            },
            "current_period_start": PERIOD_START,
            "current_period_end": PERIOD_START + 30 * 86_400
        }]},
        "metadata": { "userId": USER.to_string() }
    })
}

pub fn subscription_invoice(id: &str, subscription_id: &str, billing_reason: &str, amount_paid: i64) -> Value {
    json!({
        "id": id,
        "customer": "cus_1",
        "subscription": subscription_id,
        "status": "paid",
        "billing_reason": billing_reason,
        "currency": "usd",
        "amount_paid": amount_paid,
        "subtotal": amount_paid,
        "payment_intent": format!("pi_{}", id)
    })
}
