use async_trait::async_trait;
use reqwest::Client;
use tracing::instrument;

use super::{read_json, request_failed};
use crate::config::settings::StripeConfig;
use crate::error::AppError;
use crate::stripe_types::{
    Charge, CheckoutSession, Customer, Invoice, List, Refund, Subscription,
};

/// The subset of the Stripe REST API the ledger calls.
#[async_trait]
pub trait StripeApi: Send + Sync {
    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, AppError>;
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription, AppError>;
    async fn retrieve_customer(&self, customer_id: &str) -> Result<Customer, AppError>;
    async fn retrieve_charge(&self, charge_id: &str) -> Result<Charge, AppError>;
    /// Payment intent of an invoice's first payment, if any.
    async fn invoice_payment_intent(&self, invoice_id: &str) -> Result<Option<String>, AppError>;
    async fn create_refund(&self, charge_id: &str, reason: &str) -> Result<Refund, AppError>;
    async fn list_customer_subscriptions(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<Subscription>, AppError>;
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<Subscription, AppError>;
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<T, AppError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .query(query)
            .send()
            .await
            .map_err(|e| request_failed(context, e))?;
        read_json(response, context).await
    }
}

#[async_trait]
impl StripeApi for StripeClient {
    #[instrument(skip(self))]
    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, AppError> {
        self.get(
            &format!("/checkout/sessions/{}", session_id),
            &[("expand[]", "payment_intent"), ("expand[]", "subscription")],
            &format!("Failed to retrieve checkout session {}", session_id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription, AppError> {
        self.get(
            &format!("/subscriptions/{}", subscription_id),
            &[],
            &format!("Failed to retrieve subscription {}", subscription_id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn retrieve_customer(&self, customer_id: &str) -> Result<Customer, AppError> {
        self.get(
            &format!("/customers/{}", customer_id),
            &[],
            &format!("Failed to retrieve customer {}", customer_id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn retrieve_charge(&self, charge_id: &str) -> Result<Charge, AppError> {
        self.get(
            &format!("/charges/{}", charge_id),
            &[],
            &format!("Failed to retrieve charge {}", charge_id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn invoice_payment_intent(&self, invoice_id: &str) -> Result<Option<String>, AppError> {
        let invoice: Invoice = self
            .get(
                &format!("/invoices/{}", invoice_id),
                &[("expand[]", "payments")],
                &format!("Failed to retrieve invoice {}", invoice_id),
            )
            .await?;
        Ok(invoice.payment_intent_id().map(str::to_string))
    }

    #[instrument(skip(self))]
    async fn create_refund(&self, charge_id: &str, reason: &str) -> Result<Refund, AppError> {
        let context = format!("Failed to create refund for charge {}", charge_id);
        let response = self
            .client
            .post(format!("{}/refunds", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&[("charge", charge_id), ("reason", reason)])
            .send()
            .await
            .map_err(|e| request_failed(&context, e))?;
        read_json(response, &context).await
    }

    #[instrument(skip(self))]
    async fn list_customer_subscriptions(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<Subscription>, AppError> {
        let limit = limit.to_string();
        let list: List<Subscription> = self
            .get(
                "/subscriptions",
                &[("customer", customer_id), ("limit", limit.as_str())],
                &format!("Failed to list subscriptions for customer {}", customer_id),
            )
            .await?;
        Ok(list.data)
    }

    #[instrument(skip(self))]
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<Subscription, AppError> {
        let context = format!("Failed to cancel subscription {}", subscription_id);
        let response = self
            .client
            .delete(format!("{}/subscriptions/{}", self.base_url, subscription_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| request_failed(&context, e))?;
        read_json(response, &context).await
    }
}
