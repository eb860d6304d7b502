use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use uuid::Uuid;

use crate::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_BODY_LOG_SIZE: usize = 1024; // 1KB limit for body logging

/// Summary of a request body that is safe to log.
fn describe_body(bytes: &[u8]) -> String {
    if bytes.len() > MAX_BODY_LOG_SIZE {
        return format!("[{} bytes, not logged]", bytes.len());
    }
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(json) => {
            let sanitized = crate::utils::sanitize::sanitize_json(&json);
            serde_json::to_string(&sanitized).unwrap_or_else(|_| "[invalid json]".to_string())
        }
        Err(_) => format!("[non-json, {} bytes]", bytes.len()),
    }
}

pub async fn request_logger_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next<Body>,
) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let request_id_value = HeaderValue::from_str(&request_id)
        .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    req.headers_mut()
        .insert(REQUEST_ID_HEADER, request_id_value.clone());

    // Webhook bodies are left alone: the signature covers the raw bytes.
    let log_body = state.config.log_request_body && !uri.path().starts_with("/webhooks");

    if log_body {
        let (parts, body) = req.into_parts();
        let bytes = match hyper::body::to_bytes(body).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%request_id, %method, %uri, error = %e, "Failed to read request body");
                Default::default()
            }
        };

        tracing::info!(
            %request_id,
            %method,
            %uri,
            body_size = bytes.len(),
            body = %describe_body(&bytes),
            "Incoming request"
        );

        req = Request::from_parts(parts, Body::from(bytes));
    } else {
        tracing::info!(%request_id, %method, %uri, "Incoming request");
    }

    let mut response = next.run(req).await;

    tracing::info!(
        %request_id,
        %method,
        %uri,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis(),
        "Outgoing response"
    );

    response
        .headers_mut()
        .insert(REQUEST_ID_HEADER, request_id_value);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_sensitive_fields_in_logged_body() {
        let logged = describe_body(br#"{"clientSecret":"pi_123_secret_456","amount":10}"#);
        assert!(logged.contains("****"));
        assert!(!logged.contains("pi_123_secret_456"));
        assert!(logged.contains("\"amount\":10"));
    }

    #[test]
    fn large_and_binary_bodies_are_summarized() {
        assert_eq!(describe_body(&[b'x'; 2048]), "[2048 bytes, not logged]");
        assert_eq!(describe_body(b"plain"), "[non-json, 5 bytes]");
    }
}
