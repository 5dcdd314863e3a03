use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Debug, Serialize)]
pub struct ProviderStatus {
    pub stripe: bool,
    pub creem: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Which providers accept webhooks.
    pub providers: ProviderStatus,
}

/// Liveness probe. Reports only whether each provider is wired, never its settings.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        providers: ProviderStatus {
            stripe: state.stripe.is_some(),
            creem: state.creem.is_some(),
        },
    })
}
