use std::env;
use crate::error::AppError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppSettings {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub stripe: Option<StripeConfig>,
    pub creem: Option<CreemConfig>,
    pub notifications: NotificationConfig,
    pub billing: BillingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub environment: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base_url: String,
    pub fraud_policy: FraudPolicy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreemConfig {
    pub api_key: String,
    pub webhook_secret: String,
    pub api_base_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub mailgun_api_key: Option<String>,
    pub mailgun_domain: Option<String>,
    pub mailgun_base_url: String,
    pub from_email: String,
    pub admin_email: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BillingConfig {
    pub default_currency: String,
    pub credit_retry_attempts: u32,
    pub yearly_allocation_cron: String,
}

/// Automatic responses to a Stripe Radar early fraud warning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudPolicy {
    pub refund: bool,
    pub email: bool,
}

impl FraudPolicy {
    /// Parses a comma-separated action list such as `"refund,email"`.
    pub fn parse(raw: &str) -> Self {
        let mut policy = FraudPolicy::default();
        for action in raw.split(',').map(|a| a.trim().to_lowercase()) {
            match action.as_str() {
                "refund" => policy.refund = true,
                "email" => policy.email = true,
                "" => {}
                other => log::warn!("Ignoring unknown fraud warning action '{}'", other),
            }
        }
        policy
    }

    pub fn is_disabled(&self) -> bool {
        !self.refund && !self.email
    }
}

impl AppSettings {
    pub fn from_env() -> Result<Self, AppError> {
        // App config
        let app_name = env::var("APP_NAME").unwrap_or_else(|_| "payment-ledger".to_string());
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        // Database config
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Configuration("DATABASE_URL must be set".to_string()))?;

        // Server config
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|_| AppError::Configuration("SERVER_PORT must be a valid port number".to_string()))?;

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        // Auth config
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Configuration("JWT_SECRET must be set".to_string()))?;

        // Providers are optional; each one needs both its API key and webhook secret
        let stripe = match (non_empty_var("STRIPE_SECRET_KEY"), non_empty_var("STRIPE_WEBHOOK_SECRET")) {
            (Some(secret_key), Some(webhook_secret)) => Some(StripeConfig {
                secret_key,
                webhook_secret,
                api_base_url: base_url_var("STRIPE_API_BASE_URL", "https://api.stripe.com/v1")?,
                fraud_policy: FraudPolicy::parse(
                    &env::var("STRIPE_RADAR_EARLY_FRAUD_WARNING_TYPE").unwrap_or_default(),
                ),
            }),
            _ => {
                log::warn!("STRIPE_SECRET_KEY or STRIPE_WEBHOOK_SECRET is not set; Stripe is disabled");
                None
            }
        };

        let creem = match (non_empty_var("CREEM_API_KEY"), non_empty_var("CREEM_WEBHOOK_SECRET")) {
            (Some(api_key), Some(webhook_secret)) => Some(CreemConfig {
                api_key,
                webhook_secret,
                api_base_url: base_url_var("CREEM_API_BASE_URL", "https://api.creem.io/v1")?,
            }),
            _ => {
                log::warn!("CREEM_API_KEY or CREEM_WEBHOOK_SECRET is not set; Creem is disabled");
                None
            }
        };

        // Notifications
        let notifications = NotificationConfig {
            mailgun_api_key: non_empty_var("MAILGUN_API_KEY"),
            mailgun_domain: non_empty_var("MAILGUN_DOMAIN"),
            mailgun_base_url: base_url_var("MAILGUN_BASE_URL", "https://api.mailgun.net")?,
            from_email: env::var("FROM_EMAIL").unwrap_or_else(|_| "billing@localhost".to_string()),
            admin_email: non_empty_var("ADMIN_EMAIL"),
        };

        // Billing
        let credit_retry_attempts = env::var("CREDIT_RETRY_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()
            .map_err(|_| AppError::Configuration("CREDIT_RETRY_ATTEMPTS must be a valid number".to_string()))?;
        if credit_retry_attempts == 0 {
            return Err(AppError::Configuration("CREDIT_RETRY_ATTEMPTS must be at least 1".to_string()));
        }

        let billing = BillingConfig {
            default_currency: env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            credit_retry_attempts,
            yearly_allocation_cron: env::var("YEARLY_ALLOCATION_CRON")
                .unwrap_or_else(|_| "0 10 0 * * *".to_string()),
        };

        Ok(Self {
            app: AppConfig {
                name: app_name,
                environment,
            },
            database: DatabaseConfig {
                url: database_url,
            },
            server: ServerConfig {
                host: server_host,
                port: server_port,
                cors_origins,
            },
            auth: AuthConfig { jwt_secret },
            stripe,
            creem,
            notifications,
            billing,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn base_url_var(key: &str, default: &str) -> Result<String, AppError> {
    let raw = non_empty_var(key).unwrap_or_else(|| default.to_string());
    validate_base_url(key, &raw)
}

/// Checks that a provider base URL is absolute http(s) and strips any trailing slash.
pub fn validate_base_url(key: &str, raw: &str) -> Result<String, AppError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| AppError::Configuration(format!("{} is not a valid URL: {}", key, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(AppError::Configuration(format!("{} must be an http(s) URL", key)));
    }
    Ok(raw.trim_end_matches('/').to_string())
}
