use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use super::JsonBody;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::use_cases::{FundingReceipt, WithdrawalReceipt};
use crate::validation::{CreateWalletRequest, FundWalletRequest, WithdrawRequest};
use crate::AppState;

#[utoipa::path(
    post,
    path = "/wallets",
    request_body = CreateWalletRequest,
    responses(
        (status = 201, description = "Wallet created"),
        (status = 400, description = "Missing or unsupported currency"),
        (status = 409, description = "Wallet already exists for this currency")
    ),
    security(("bearer_auth" = [])),
    tag = "Wallets"
)]
pub async fn create_wallet(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<CreateWalletRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .wallets
        .create_wallet(user.owner_id, &payload.currency)
        .await?;
    state.notifier.dispatch(outcome.events);

    Ok((StatusCode::CREATED, Json(outcome.value)))
}

#[utoipa::path(
    get,
    path = "/wallets",
    responses((status = 200, description = "Caller's wallets, oldest first")),
    security(("bearer_auth" = [])),
    tag = "Wallets"
)]
pub async fn list_wallets(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let wallets = state.wallets.list_wallets(user.owner_id).await?;
    Ok(Json(wallets))
}

#[utoipa::path(
    post,
    path = "/wallets/fund",
    request_body = FundWalletRequest,
    responses(
        (status = 201, description = "Funding initiated; balance is credited on confirmation", body = FundingReceipt),
        (status = 400, description = "Invalid amount"),
        (status = 403, description = "Wallet is not active"),
        (status = 404, description = "Wallet not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Wallets"
)]
pub async fn fund_wallet(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<FundWalletRequest>,
) -> Result<impl IntoResponse, AppError> {
    let command = payload.into_command()?;
    let outcome = state.wallets.fund(user.owner_id, command).await?;
    state.notifier.dispatch(outcome.events);

    Ok((StatusCode::CREATED, Json(outcome.value)))
}

#[utoipa::path(
    post,
    path = "/wallets/withdraw",
    request_body = WithdrawRequest,
    responses(
        (status = 201, description = "Withdrawal initiated", body = WithdrawalReceipt),
        (status = 400, description = "Invalid amount or insufficient balance"),
        (status = 403, description = "Wallet is not active"),
        (status = 404, description = "Wallet not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Wallets"
)]
pub async fn withdraw(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<WithdrawRequest>,
) -> Result<impl IntoResponse, AppError> {
    let command = payload.into_command()?;
    let outcome = state.wallets.withdraw(user.owner_id, command).await?;
    state.notifier.dispatch(outcome.events);

    Ok((StatusCode::CREATED, Json(outcome.value)))
}
