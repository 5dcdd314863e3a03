use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use serde::{Deserialize, Serialize};
use std::future::{Ready, ready};
use uuid::Uuid;

use crate::config::AppSettings;
use crate::error::AppError;
use crate::models::auth_jwt_claims::Claims;

/// Caller identity resolved from the `Authorization: Bearer` header.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        ready(authenticate(req, payload))
    }
}

fn authenticate(req: &HttpRequest, payload: &mut Payload) -> Result<AuthenticatedUser, AppError> {
    let settings = req
        .app_data::<web::Data<AppSettings>>()
        .ok_or_else(|| AppError::Configuration("AppSettings not registered".to_string()))?;

    let bearer = BearerAuth::from_request(req, payload)
        .into_inner()
        .map_err(|_| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = Claims::verify(bearer.token(), &settings.auth.jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Token subject is not a user id".to_string()))?;

    Ok(AuthenticatedUser {
        user_id,
        email: claims.email,
    })
}
