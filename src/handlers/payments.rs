use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use super::JsonBody;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::use_cases::PaymentReceipt;
use crate::validation::MakePaymentRequest;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/payments",
    request_body = MakePaymentRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Replays the first response for repeated keys")
    ),
    responses(
        (status = 201, description = "Payment initiated", body = PaymentReceipt),
        (status = 400, description = "Invalid request or insufficient balance"),
        (status = 403, description = "Wallet is not active"),
        (status = 404, description = "No wallet in the source currency"),
        (status = 409, description = "Same Idempotency-Key still in flight"),
        (status = 429, description = "Too many requests"),
        (status = 500, description = "Payment initiation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn make_payment(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<MakePaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let command = payload.into_command()?;
    let outcome = state.payments.make_payment(user.owner_id, command).await?;
    state.notifier.dispatch(outcome.events);

    Ok((StatusCode::CREATED, Json(outcome.value)))
}
