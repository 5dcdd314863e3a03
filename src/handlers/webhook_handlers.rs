use actix_web::{post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{error, info};
use serde_json::json;

use crate::app_state::AppState;
use crate::creem_types::CreemEvent;
use crate::error::AppError;
use crate::models::PaymentProvider;
use crate::stripe_types::Event;
use crate::utils::admin_alerting::{AdminAlert, AlertSeverity, AlertType};
use crate::utils::signature::{verify_creem_signature, verify_stripe_signature};

fn signature_header<'a>(req: &'a HttpRequest, name: &str) -> Result<&'a str, AppError> {
    req.headers()
        .get(name)
        .ok_or_else(|| {
            error!("Missing {} header in webhook request", name);
            AppError::BadRequest(format!("Missing {} header", name))
        })?
        .to_str()
        .map_err(|e| {
            error!("Invalid {} header encoding: {}", name, e);
            AppError::BadRequest(format!("Invalid {} header", name))
        })
}

/// Logs the failure as an admin alert and turns it into a 500 so the provider redelivers.
fn processing_failed(provider: PaymentProvider, event_id: &str, event_type: &str, err: AppError) -> AppError {
    error!("Failed to process {} webhook event {} (type: {}): {}", provider, event_id, event_type, err);
    AdminAlert::new(
        AlertSeverity::Critical,
        AlertType::WebhookProcessingFailure,
        format!("{} webhook processing failed", provider),
        err.to_string(),
    )
    .with_metadata("event_id", event_id)
    .with_metadata("event_type", event_type)
    .with_metadata("permanent", err.is_permanent())
    .log();
    AppError::Internal(format!("Webhook handler failed for event {}", event_id))
}

fn received() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "received": true }))
}

#[post("/stripe")]
pub async fn stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let endpoint = state.stripe.as_ref().ok_or_else(|| {
        error!("Stripe webhook received but Stripe is not configured");
        AppError::Configuration("Stripe webhook secret not configured".to_string())
    })?;

    let signature = signature_header(&req, "Stripe-Signature")?;
    verify_stripe_signature(&body, signature, &endpoint.secret, Utc::now().timestamp()).map_err(|e| {
        error!("Stripe webhook signature verification failed: {}", e);
        e
    })?;

    let event: Event = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid Stripe event payload: {}", e)))?;
    info!("Verified Stripe webhook event {} (type: {})", event.id, event.type_);

    endpoint
        .processor
        .process(&event)
        .await
        .map_err(|e| processing_failed(PaymentProvider::Stripe, &event.id, &event.type_, e))?;
    Ok(received())
}

#[post("/creem")]
pub async fn creem_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let endpoint = state.creem.as_ref().ok_or_else(|| {
        error!("Creem webhook received but Creem is not configured");
        AppError::Configuration("Creem webhook secret not configured".to_string())
    })?;

    let signature = signature_header(&req, "creem-signature")?;
    verify_creem_signature(&body, signature, &endpoint.secret).map_err(|e| {
        error!("Creem webhook signature verification failed: {}", e);
        e
    })?;

    let event: CreemEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid Creem event payload: {}", e)))?;
    info!("Verified Creem webhook event {} (type: {})", event.id, event.event_type);

    endpoint
        .processor
        .process(&event)
        .await
        .map_err(|e| processing_failed(PaymentProvider::Creem, &event.id, &event.event_type, e))?;
    Ok(received())
}
