use axum::{
    async_trait,
    body::Body,
    extract::FromRequest,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::processor::webhook::{verify_signature, SignatureError, SIGNATURE_HEADER};
use crate::AppState;

/// Extractor that verifies the `stripe-signature` header against the raw
/// request body before any handler code runs.
pub struct VerifiedWebhook {
    pub body: Vec<u8>,
}

#[async_trait]
impl FromRequest<AppState, Body> for VerifiedWebhook {
    type Rejection = WebhookAuthError;

    async fn from_request(req: Request<Body>, state: &AppState) -> Result<Self, Self::Rejection> {
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or(WebhookAuthError::Signature(SignatureError::MissingHeader))?;

        let body_bytes = hyper::body::to_bytes(req.into_body())
            .await
            .map_err(|_| WebhookAuthError::BodyReadError)?
            .to_vec();

        verify_signature(
            &body_bytes,
            &signature,
            &state.config.processor_webhook_secret,
            state.config.webhook_tolerance_secs,
            Utc::now().timestamp(),
        )
        .map_err(WebhookAuthError::Signature)?;

        Ok(VerifiedWebhook { body: body_bytes })
    }
}

#[derive(Debug)]
pub enum WebhookAuthError {
    Signature(SignatureError),
    BodyReadError,
}

impl IntoResponse for WebhookAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebhookAuthError::Signature(SignatureError::InvalidSecret) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Invalid webhook secret configuration".to_string(),
            ),
            WebhookAuthError::Signature(e) => {
                (StatusCode::BAD_REQUEST, format!("Webhook Error: {}", e))
            }
            WebhookAuthError::BodyReadError => {
                (StatusCode::BAD_REQUEST, "Failed to read request body".to_string())
            }
        };

        tracing::warn!(error = ?self, "Webhook authentication failed");
        (
            status,
            Json(json!({ "message": message, "status": status.as_u16() })),
        )
            .into_response()
    }
}
