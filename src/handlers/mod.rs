pub mod auth;
pub mod fx;
pub mod payments;
pub mod transactions;
pub mod wallets;
pub mod webhook;
pub mod ws;

use crate::error::AppError;
use crate::health::{check_health, HealthResponse};
use crate::AppState;
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequest, State},
    http::{Request, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::de::DeserializeOwned;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy or degraded", body = HealthResponse),
        (status = 503, description = "A critical dependency is down", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = check_health(&state.health_checks, state.start_time).await;

    let status_code = if report.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(report))
}

/// `Json` whose rejections (bad syntax, wrong types, missing content type)
/// surface as the usual 400 error body.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S, Body> for JsonBody<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request<Body>, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "flowpay-core", description = "Wallet and payment transaction API"),
    paths(
        health,
        payments::make_payment,
        wallets::create_wallet,
        wallets::list_wallets,
        wallets::fund_wallet,
        wallets::withdraw,
        transactions::list_transactions,
        transactions::get_transaction,
        fx::list_rates,
        fx::convert,
        webhook::processor_webhook,
    ),
    components(schemas(
        HealthResponse,
        crate::validation::MakePaymentRequest,
        crate::validation::CreateWalletRequest,
        crate::validation::FundWalletRequest,
        crate::validation::WithdrawRequest,
        crate::use_cases::PaymentReceipt,
        crate::use_cases::FundingReceipt,
        crate::use_cases::WithdrawalReceipt,
        webhook::WebhookAck,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "Payments", description = "Cross-currency payments"),
        (name = "Wallets", description = "Wallet lifecycle, funding and withdrawals"),
        (name = "Transactions", description = "Transaction history"),
        (name = "FX", description = "Exchange rates"),
        (name = "Webhooks", description = "Processor event deliveries"),
        (name = "Health", description = "Liveness and dependency report")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
