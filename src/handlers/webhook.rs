use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;

use super::auth::VerifiedWebhook;
use crate::processor::ProcessorEvent;
use crate::use_cases::Reconciliation;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

/// Processor event delivery. Once the signature is verified every outcome is
/// acknowledged with 200 so the processor stops redelivering; failures are
/// only logged.
#[utoipa::path(
    post,
    path = "/webhooks/processor",
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Missing or invalid signature")
    ),
    tag = "Webhooks"
)]
pub async fn processor_webhook(
    State(state): State<AppState>,
    webhook: VerifiedWebhook,
) -> impl IntoResponse {
    let ack = (StatusCode::OK, Json(WebhookAck { received: true }));

    let event: ProcessorEvent = match serde_json::from_slice(&webhook.body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Signed webhook payload could not be decoded");
            return ack;
        }
    };

    match state.reconciler.reconcile(&event).await {
        Ok(outcome) => {
            match &outcome.value {
                Reconciliation::Applied {
                    transaction_id,
                    status,
                } => tracing::info!(
                    event_id = %event.id,
                    event_type = %event.kind,
                    %transaction_id,
                    %status,
                    "Webhook reconciled"
                ),
                Reconciliation::Ignored(reason) => tracing::info!(
                    event_id = %event.id,
                    event_type = %event.kind,
                    ?reason,
                    "Webhook ignored"
                ),
            }
            state.notifier.dispatch(outcome.events);
        }
        Err(e) => {
            tracing::error!(event_id = %event.id, event_type = %event.kind, error = %e, "Webhook processing failed");
        }
    }

    ack
}
