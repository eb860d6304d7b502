use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ports::StoreError;
use crate::services::fx::FxError;
use crate::use_cases::{PaymentError, WalletOpError};
use crate::validation::ValidationError;

/// Error surfaced at the HTTP edge. The display string is the client-facing
/// message; underlying causes are logged where the error is converted.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Internal server error")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let AppError::Database(e) = &self {
            tracing::error!(error = %e, "Database error");
        }
        let body = Json(json!({
            "message": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Validation(e.message)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(message) => AppError::Validation(message),
            StoreError::Conflict(message) => AppError::Conflict(message),
            other => {
                tracing::error!(error = %other, "Ledger store error");
                AppError::Internal("Internal server error".to_string())
            }
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::Validation(_) | PaymentError::InsufficientBalance => {
                AppError::Validation(e.to_string())
            }
            PaymentError::WalletNotFound(_) => AppError::NotFound(e.to_string()),
            PaymentError::WalletInactive => AppError::Forbidden(e.to_string()),
            other => {
                tracing::error!(error = %other, "Payment initiation failed");
                AppError::Internal("Payment initiation failed".to_string())
            }
        }
    }
}

impl From<WalletOpError> for AppError {
    fn from(e: WalletOpError) -> Self {
        match e {
            WalletOpError::CurrencyRequired
            | WalletOpError::UnsupportedCurrency(_)
            | WalletOpError::InvalidAmount
            | WalletOpError::InsufficientBalance => AppError::Validation(e.to_string()),
            WalletOpError::AlreadyExists(_) => AppError::Conflict(e.to_string()),
            WalletOpError::WalletNotFound => AppError::NotFound(e.to_string()),
            WalletOpError::WalletInactive => AppError::Forbidden(e.to_string()),
            other => {
                tracing::error!(error = %other, "Wallet operation failed");
                AppError::Internal("Wallet operation failed".to_string())
            }
        }
    }
}

impl From<FxError> for AppError {
    fn from(e: FxError) -> Self {
        AppError::Validation(e.to_string())
    }
}
