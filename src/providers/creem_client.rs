use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use super::{read_json, request_failed};
use crate::config::settings::CreemConfig;
use crate::creem_types::{CreemCheckout, CreemCustomer, CreemDiscount, CreemProduct, CreemSubscription};
use crate::error::AppError;

#[async_trait]
pub trait CreemApi: Send + Sync {
    async fn retrieve_checkout(&self, checkout_id: &str) -> Result<CreemCheckout, AppError>;
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<CreemSubscription, AppError>;
    async fn retrieve_product(&self, product_id: &str) -> Result<CreemProduct, AppError>;
    async fn retrieve_customer(
        &self,
        email: Option<&str>,
        customer_id: Option<&str>,
    ) -> Result<CreemCustomer, AppError>;
    async fn create_customer_portal_link(&self, customer_id: &str) -> Result<String, AppError>;
    async fn retrieve_discount(
        &self,
        discount_id: Option<&str>,
        discount_code: Option<&str>,
    ) -> Result<CreemDiscount, AppError>;
}

#[derive(Debug, Clone)]
pub struct CreemClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct PortalLinkResponse {
    customer_portal_link: Option<String>,
}

impl CreemClient {
    pub fn new(config: &CreemConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/json")
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<T, AppError> {
        let response = self
            .request(self.client.get(format!("{}{}", self.base_url, path)))
            .query(query)
            .send()
            .await
            .map_err(|e| request_failed(context, e))?;
        read_json(response, context).await
    }
}

#[async_trait]
impl CreemApi for CreemClient {
    #[instrument(skip(self))]
    async fn retrieve_checkout(&self, checkout_id: &str) -> Result<CreemCheckout, AppError> {
        self.get(
            "/checkouts",
            &[("checkout_id", checkout_id)],
            &format!("Failed to retrieve Creem checkout {}", checkout_id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<CreemSubscription, AppError> {
        self.get(
            "/subscriptions",
            &[("subscription_id", subscription_id)],
            &format!("Failed to retrieve Creem subscription {}", subscription_id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn retrieve_product(&self, product_id: &str) -> Result<CreemProduct, AppError> {
        let context = format!("Failed to retrieve Creem product {}", product_id);
        let body: Value = self
            .get("/products", &[("product_id", product_id)], &context)
            .await?;

        // The endpoint has answered with a bare object, an array and a `data` list.
        let candidate = match &body {
            Value::Array(items) => items.first().cloned(),
            Value::Object(map) => match map.get("data") {
                Some(Value::Array(items)) => items.first().cloned(),
                _ => Some(body.clone()),
            },
            _ => None,
        };

        candidate
            .and_then(|value| serde_json::from_value::<CreemProduct>(value).ok())
            .filter(|product| !product.id.is_empty())
            .ok_or_else(|| {
                AppError::NotFound(format!("{}: Creem product {} not found.", context, product_id))
            })
    }

    #[instrument(skip(self))]
    async fn retrieve_customer(
        &self,
        email: Option<&str>,
        customer_id: Option<&str>,
    ) -> Result<CreemCustomer, AppError> {
        let mut query = Vec::new();
        if let Some(email) = email {
            query.push(("email", email));
        }
        if let Some(customer_id) = customer_id {
            query.push(("customer_id", customer_id));
        }
        if query.is_empty() {
            return Err(AppError::InvalidArgument(
                "Either email or customerId must be provided".to_string(),
            ));
        }
        self.get(
            "/customers",
            &query,
            &format!(
                "Failed to retrieve Creem customer {} {}",
                email.unwrap_or_default(),
                customer_id.unwrap_or_default()
            ),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn create_customer_portal_link(&self, customer_id: &str) -> Result<String, AppError> {
        let context = format!("Failed to create Creem customer portal link for {}", customer_id);
        let response = self
            .request(self.client.post(format!("{}/customers/billing", self.base_url)))
            .json(&json!({ "customer_id": customer_id }))
            .send()
            .await
            .map_err(|e| request_failed(&context, e))?;

        let body: PortalLinkResponse = read_json(response, &context).await?;
        body.customer_portal_link
            .filter(|link| !link.is_empty())
            .ok_or_else(|| {
                AppError::External(format!("{}: Portal link not returned from Creem API", context))
            })
    }

    #[instrument(skip(self))]
    async fn retrieve_discount(
        &self,
        discount_id: Option<&str>,
        discount_code: Option<&str>,
    ) -> Result<CreemDiscount, AppError> {
        let mut query = Vec::new();
        if let Some(id) = discount_id {
            query.push(("discount_id", id));
        }
        if let Some(code) = discount_code {
            query.push(("discount_code", code));
        }
        if query.is_empty() {
            return Err(AppError::InvalidArgument(
                "Either discountId or discountCode must be provided".to_string(),
            ));
        }
        self.get(
            "/discounts",
            &query,
            &format!(
                "Failed to retrieve Creem discount {}",
                discount_id.or(discount_code).unwrap_or_default()
            ),
        )
        .await
    }
}
