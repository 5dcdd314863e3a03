use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::AppSettings;
use crate::db::repositories::{
    OrderRepository, PricingPlanRepository, SubscriptionRepository, UsageRepository, UserRepository,
};
use crate::db::{CreditStore, OrderStore, PlanStore, SubscriptionStore, UserDirectory};
use crate::providers::{CreemAdapter, CreemApi, CreemClient, StripeAdapter, StripeApi, StripeClient};
use crate::services::fraud_responder::FraudResponder;
use crate::services::notification_service::{LogNotifier, MailgunConfig, MailgunNotifier, Notifier};
use crate::services::retry_policy::RetryPolicy;
use crate::services::subscription_change::LoggingChangeHandler;
use crate::services::{
    CreditManager, CreemWebhookProcessor, LedgerServices, OrderLedger, PaymentVerifier, StripeWebhookProcessor,
    SubscriptionSynchronizer,
};

/// The storage seams the ledger runs on.
#[derive(Clone)]
pub struct LedgerStores {
    pub orders: Arc<dyn OrderStore>,
    pub credits: Arc<dyn CreditStore>,
    pub plans: Arc<dyn PlanStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub users: Arc<dyn UserDirectory>,
}

impl LedgerStores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            orders: Arc::new(OrderRepository::new(pool.clone())),
            credits: Arc::new(UsageRepository::new(pool.clone())),
            plans: Arc::new(PricingPlanRepository::new(pool.clone())),
            subscriptions: Arc::new(SubscriptionRepository::new(pool.clone())),
            users: Arc::new(UserRepository::new(pool)),
        }
    }
}

/// A provider's webhook processor together with its signing secret.
pub struct WebhookEndpoint<P> {
    pub processor: P,
    pub secret: String,
}

/// Application state shared across request handlers
pub struct AppState {
    pub stripe: Option<WebhookEndpoint<StripeWebhookProcessor>>,
    pub creem: Option<WebhookEndpoint<CreemWebhookProcessor>>,
    pub verifier: PaymentVerifier,
    pub credits: CreditManager,
}

/// Outbound provider APIs, `None` for a provider that is not configured.
#[derive(Clone, Default)]
pub struct ProviderApis {
    pub stripe: Option<Arc<dyn StripeApi>>,
    pub creem: Option<Arc<dyn CreemApi>>,
}

impl ProviderApis {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            stripe: settings
                .stripe
                .as_ref()
                .map(|config| Arc::new(StripeClient::new(config)) as Arc<dyn StripeApi>),
            creem: settings
                .creem
                .as_ref()
                .map(|config| Arc::new(CreemClient::new(config)) as Arc<dyn CreemApi>),
        }
    }
}

impl AppState {
    /// Wires every service from the stores and provider clients.
    pub fn build(
        settings: &AppSettings,
        stores: LedgerStores,
        apis: ProviderApis,
        notifier: Arc<dyn Notifier>,
        retry: RetryPolicy,
    ) -> Self {
        let orders = OrderLedger::new(stores.orders.clone());
        let credits = CreditManager::new(stores.plans.clone(), stores.credits.clone(), retry);
        let subscriptions = SubscriptionSynchronizer::new(stores.subscriptions.clone());
        let services = LedgerServices {
            orders: orders.clone(),
            credits: credits.clone(),
            subscriptions: subscriptions.clone(),
            plans: stores.plans.clone(),
            users: stores.users.clone(),
            notifier: notifier.clone(),
            default_currency: settings.billing.default_currency.clone(),
        };

        let stripe_adapter = apis
            .stripe
            .clone()
            .map(|api| Arc::new(StripeAdapter::new(api, stores.plans.clone(), stores.users.clone())));
        let creem_adapter = apis
            .creem
            .clone()
            .map(|api| Arc::new(CreemAdapter::new(api, stores.plans.clone(), stores.subscriptions.clone())));

        let stripe = match (&settings.stripe, &stripe_adapter) {
            (Some(config), Some(adapter)) => {
                let fraud = FraudResponder::new(
                    adapter.api().clone(),
                    stores.users.clone(),
                    notifier.clone(),
                    config.fraud_policy,
                );
                Some(WebhookEndpoint {
                    processor: StripeWebhookProcessor::new(
                        services.clone(),
                        adapter.clone(),
                        Arc::new(LoggingChangeHandler),
                        fraud,
                    ),
                    secret: config.webhook_secret.clone(),
                })
            }
            _ => None,
        };
        let creem = match (&settings.creem, &creem_adapter) {
            (Some(config), Some(adapter)) => Some(WebhookEndpoint {
                processor: CreemWebhookProcessor::new(services.clone(), adapter.clone()),
                secret: config.webhook_secret.clone(),
            }),
            _ => None,
        };

        Self {
            stripe,
            creem,
            verifier: PaymentVerifier::new(orders, subscriptions, stripe_adapter, creem_adapter),
            credits,
        }
    }
}

/// Mailgun when it is configured, otherwise log-only notifications.
pub fn notifier_from_settings(settings: &AppSettings, users: Arc<dyn UserDirectory>) -> Arc<dyn Notifier> {
    match MailgunConfig::from_settings(&settings.notifications) {
        Some(config) => Arc::new(MailgunNotifier::new(config, users)),
        None => {
            log::warn!("Mailgun is not configured; notifications are written to the log only");
            Arc::new(LogNotifier)
        }
    }
}

pub fn retry_from_settings(settings: &AppSettings) -> RetryPolicy {
    RetryPolicy::new(settings.billing.credit_retry_attempts, Duration::from_secs(1))
}
