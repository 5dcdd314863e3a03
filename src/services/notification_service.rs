use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use log::{info, warn};
use reqwest::Client;
use uuid::Uuid;

use crate::config::settings::NotificationConfig;
use crate::db::UserDirectory;
use crate::error::AppError;
use crate::models::PaymentProvider;
use crate::utils::admin_alerting::{AdminAlert, AlertSeverity, AlertType};

#[derive(Debug, Clone)]
pub struct CreditUpgradeFailure {
    pub provider: PaymentProvider,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub plan_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct InvoicePaymentFailedNotice {
    pub user_id: Option<Uuid>,
    pub invoice_id: String,
    pub subscription_id: String,
    pub customer_id: String,
}

#[derive(Debug, Clone)]
pub struct FraudWarningReport {
    pub warning_id: String,
    pub charge_id: String,
    pub customer_id: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
    pub fraud_type: String,
    pub charge_description: Option<String>,
    pub actions_taken: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FraudRefundNotice {
    pub user_id: Option<Uuid>,
    pub charge_id: String,
    pub amount: BigDecimal,
    pub currency: String,
}

/// Operator and customer notifications raised by the ledger.
///
/// Callers treat failures as non-fatal: a notification never undoes a
/// committed balance change.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn credit_upgrade_failed(&self, failure: &CreditUpgradeFailure) -> Result<(), AppError>;
    async fn invoice_payment_failed(&self, notice: &InvoicePaymentFailedNotice) -> Result<(), AppError>;
    async fn fraud_warning_admin(&self, report: &FraudWarningReport) -> Result<(), AppError>;
    async fn fraud_refund_user(&self, notice: &FraudRefundNotice) -> Result<(), AppError>;
}

fn credit_upgrade_alert(failure: &CreditUpgradeFailure) -> AdminAlert {
    AdminAlert::new(
        AlertSeverity::Critical,
        AlertType::CreditGrantFailure,
        "Credit upgrade failed",
        format!(
            "Granting credits for order {} failed after retries: {}",
            failure.order_id, failure.error
        ),
    )
    .with_metadata("provider", failure.provider)
    .with_metadata("user_id", failure.user_id)
    .with_metadata("order_id", failure.order_id)
    .with_metadata("plan_id", failure.plan_id)
}

fn fraud_warning_alert(report: &FraudWarningReport) -> AdminAlert {
    let mut alert = AdminAlert::new(
        AlertSeverity::High,
        AlertType::FraudWarning,
        format!("{} on charge {}", report.fraud_type, report.charge_id),
        format!("Actions taken: {}", report.actions_taken.join("; ")),
    )
    .with_metadata("warning_id", &report.warning_id)
    .with_metadata("charge_id", &report.charge_id)
    .with_metadata("amount", format!("{} {}", report.amount, report.currency.to_uppercase()));
    if let Some(customer_id) = &report.customer_id {
        alert = alert.with_metadata("customer_id", customer_id);
    }
    if let Some(description) = &report.charge_description {
        alert = alert.with_metadata("charge_description", description);
    }
    alert
}

/// Writes every notification to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn credit_upgrade_failed(&self, failure: &CreditUpgradeFailure) -> Result<(), AppError> {
        credit_upgrade_alert(failure).log();
        Ok(())
    }

    async fn invoice_payment_failed(&self, notice: &InvoicePaymentFailedNotice) -> Result<(), AppError> {
        info!(
            "Invoice {} payment failed for subscription {} (customer {})",
            notice.invoice_id, notice.subscription_id, notice.customer_id
        );
        Ok(())
    }

    async fn fraud_warning_admin(&self, report: &FraudWarningReport) -> Result<(), AppError> {
        fraud_warning_alert(report).log();
        Ok(())
    }

    async fn fraud_refund_user(&self, notice: &FraudRefundNotice) -> Result<(), AppError> {
        info!(
            "Charge {} refunded as fraudulent: {} {}",
            notice.charge_id, notice.amount, notice.currency
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MailgunConfig {
    pub api_key: String,
    pub domain: String,
    pub base_url: String,
    pub from_email: String,
    pub admin_email: Option<String>,
}

impl MailgunConfig {
    /// `None` unless both the API key and the sending domain are configured.
    pub fn from_settings(config: &NotificationConfig) -> Option<Self> {
        Some(Self {
            api_key: config.mailgun_api_key.clone()?,
            domain: config.mailgun_domain.clone()?,
            base_url: config.mailgun_base_url.trim_end_matches('/').to_string(),
            from_email: config.from_email.clone(),
            admin_email: config.admin_email.clone(),
        })
    }
}

/// Sends notifications through the Mailgun messages API.
pub struct MailgunNotifier {
    config: MailgunConfig,
    client: Client,
    users: Arc<dyn UserDirectory>,
}

impl MailgunNotifier {
    pub fn new(config: MailgunConfig, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            config,
            client: Client::new(),
            users,
        }
    }

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), AppError> {
        let url = format!("{}/v3/{}/messages", self.config.base_url, self.config.domain);
        let form = [
            ("from", self.config.from_email.as_str()),
            ("to", recipient),
            ("subject", subject),
            ("text", body),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth("api", Some(&self.config.api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::External(format!("Mailgun request error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "no error details".to_string());
            return Err(AppError::External(format!(
                "Mailgun API error: {} - {}",
                status, error_text
            )));
        }

        info!("Email '{}' sent via Mailgun to {}", subject, recipient);
        Ok(())
    }

    async fn send_admin(&self, alert: &AdminAlert) -> Result<(), AppError> {
        alert.log();
        match &self.config.admin_email {
            Some(recipient) => self.send(recipient, &alert.subject(), &alert.email_body()).await,
            None => {
                warn!("ADMIN_EMAIL not set, skipping email for alert {}", alert.alert_id);
                Ok(())
            }
        }
    }

    async fn user_email(&self, user_id: Option<Uuid>) -> Result<Option<String>, AppError> {
        match user_id {
            Some(user_id) => self.users.find_email(user_id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Notifier for MailgunNotifier {
    async fn credit_upgrade_failed(&self, failure: &CreditUpgradeFailure) -> Result<(), AppError> {
        self.send_admin(&credit_upgrade_alert(failure)).await
    }

    async fn invoice_payment_failed(&self, notice: &InvoicePaymentFailedNotice) -> Result<(), AppError> {
        let Some(email) = self.user_email(notice.user_id).await? else {
            warn!(
                "No email on file for the owner of subscription {}, skipping payment failed notice",
                notice.subscription_id
            );
            return Ok(());
        };
        let body = format!(
            "We were unable to process the payment for your subscription (invoice {}).\n\n\
             Please update your payment method to keep your subscription active.",
            notice.invoice_id
        );
        self.send(&email, "Action required: subscription payment failed", &body).await
    }

    async fn fraud_warning_admin(&self, report: &FraudWarningReport) -> Result<(), AppError> {
        self.send_admin(&fraud_warning_alert(report)).await
    }

    async fn fraud_refund_user(&self, notice: &FraudRefundNotice) -> Result<(), AppError> {
        let Some(email) = self.user_email(notice.user_id).await? else {
            warn!("No email on file for charge {}, skipping refund notice", notice.charge_id);
            return Ok(());
        };
        let body = format!(
            "Your payment of {} {} was flagged by our payment processor and has been refunded in full.\n\n\
             If you believe this was a mistake, please contact support.",
            notice.amount,
            notice.currency.to_uppercase()
        );
        self.send(&email, "Your payment has been refunded", &body).await
    }
}
