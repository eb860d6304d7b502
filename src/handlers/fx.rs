use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};

use crate::config::currencies::BRIDGE_CURRENCY;
use crate::error::AppError;
use crate::validation::{ConvertQuery, RatesQuery};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/fx/rates",
    params(RatesQuery),
    responses(
        (status = 200, description = "Rates of every supported currency against the base"),
        (status = 400, description = "Unsupported base currency")
    ),
    tag = "FX"
)]
pub async fn list_rates(
    State(state): State<AppState>,
    Query(query): Query<RatesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let base = query
        .base
        .map(|b| b.trim().to_uppercase())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| BRIDGE_CURRENCY.to_string());

    let listing = state.fx.list_rates(&base).await?;
    Ok(Json(listing))
}

#[utoipa::path(
    get,
    path = "/fx/convert",
    params(ConvertQuery),
    responses(
        (status = 200, description = "Converted amount, rounded to cents"),
        (status = 400, description = "Invalid amount or unsupported currency")
    ),
    tag = "FX"
)]
pub async fn convert(
    State(state): State<AppState>,
    Query(query): Query<ConvertQuery>,
) -> Result<impl IntoResponse, AppError> {
    let command = query.into_command()?;
    let conversion = state
        .fx
        .convert(&command.amount, &command.from, &command.to)
        .await?;
    Ok(Json(conversion))
}
