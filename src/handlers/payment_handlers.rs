use actix_web::{get, web, HttpResponse};
use log::info;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::error::AppError;
use crate::models::{AuthenticatedUser, PaymentProvider};

#[derive(Debug, Deserialize)]
pub struct VerifySuccessQuery {
    pub provider: Option<String>,
    pub session_id: Option<String>,
    pub checkout_id: Option<String>,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Missing {} parameter", name)))
}

/// Confirms a checkout for the success page after the provider redirect.
#[get("/verify-success")]
pub async fn verify_success(
    user: AuthenticatedUser,
    query: web::Query<VerifySuccessQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let provider: PaymentProvider = required(&query.provider, "provider")?.parse()?;
    info!("Verifying {} checkout for user {}", provider, user.user_id);

    let response = match provider {
        PaymentProvider::Stripe => {
            let session_id = required(&query.session_id, "session_id")?;
            state.verifier.verify_stripe(session_id, user.user_id).await?
        }
        PaymentProvider::Creem => {
            let checkout_id = required(&query.checkout_id, "checkout_id")?;
            state.verifier.verify_creem(checkout_id, user.user_id).await?
        }
    };

    Ok(HttpResponse::Ok().json(response))
}
