//! Outbound REST clients for the payment providers and the adapter seam the
//! ledger services use instead of branching on provider identity.

pub mod adapter;
pub mod creem_client;
pub mod stripe_client;

pub use adapter::{CreemAdapter, PaymentProviderAdapter, ProviderSubscription, StripeAdapter};
pub use creem_client::{CreemApi, CreemClient};
pub use stripe_client::{StripeApi, StripeClient};

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AppError;

/// Pulls a human readable message out of a provider error body.
///
/// Understands `{"error": {"message": ..}}`, `{"message": ..}` and
/// `{"message": [..]}`; anything else is returned as raw text.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(message) = json.pointer("/error/message").and_then(Value::as_str) {
            return message.to_string();
        }
        match json.get("message") {
            Some(Value::String(message)) => return message.clone(),
            Some(Value::Array(parts)) => {
                return parts
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
            }
            _ => {}
        }
    }
    if body.trim().is_empty() {
        format!("API responded with status {}", status)
    } else {
        body.to_string()
    }
}

fn looks_like_not_found(status: StatusCode, message: &str) -> bool {
    let lower = message.to_lowercase();
    status == StatusCode::NOT_FOUND || lower.contains("no such") || lower.contains("not found")
}

/// Maps a provider response into `T`, wrapping failures as `"<context>: <message>"`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    context: &str,
) -> Result<T, AppError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::External(format!("{}: failed to read response: {}", context, e)))?;

    if !status.is_success() {
        let message = error_message(status, &body);
        return Err(if looks_like_not_found(status, &message) {
            AppError::NotFound(format!("{}: {}", context, message))
        } else {
            AppError::External(format!("{}: {}", context, message))
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| AppError::External(format!("{}: unexpected response body: {}", context, e)))
}

pub(crate) fn request_failed(context: &str, e: reqwest::Error) -> AppError {
    AppError::External(format!("{}: {}", context, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_and_list_messages() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"error":{"message":"No such customer: 'cus_1'"}}"#),
            "No such customer: 'cus_1'"
        );
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"message":["a","b"]}"#),
            "a, b"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, ""),
            "API responded with status 502 Bad Gateway"
        );
        assert!(looks_like_not_found(StatusCode::BAD_REQUEST, "No such checkout.session: cs_x"));
    }
}
