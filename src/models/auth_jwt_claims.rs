use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// JWT claims issued by the identity service in front of this server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (as UTC timestamp)
    pub exp: usize,
    /// Issued at (as UTC timestamp)
    #[serde(default)]
    pub iat: usize,
    /// User email
    #[serde(default)]
    pub email: Option<String>,
}

impl Claims {
    /// Verifies an HS256 bearer token and returns its claims.
    pub fn verify(token: &str, secret: &str) -> Result<Claims, AppError> {
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|err| {
            warn!("JWT validation failed: {}", err);
            match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("Token has expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AppError::Unauthorized("Invalid token signature".to_string())
                }
                _ => AppError::Unauthorized("Invalid token".to_string()),
            }
        })?;

        debug!("JWT token verified for subject {}", token_data.claims.sub);
        Ok(token_data.claims)
    }
}
