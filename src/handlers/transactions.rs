use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::validation::TransactionQuery;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/transactions",
    params(TransactionQuery),
    responses(
        (status = 200, description = "Caller's transactions, newest first"),
        (status = 400, description = "Unknown filter value")
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TransactionQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = query.into_filter()?;
    let transactions = state.store.list_transactions(user.owner_id, &filter).await?;
    Ok(Json(transactions))
}

/// Someone else's transaction is reported as missing.
#[utoipa::path(
    get,
    path = "/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction"),
        (status = 404, description = "Transaction not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state
        .store
        .get_transaction(id)
        .await?
        .filter(|tx| tx.owner_id == user.owner_id)
        .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;

    Ok(Json(tx))
}
