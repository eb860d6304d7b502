//! Shadow record of a processor payment intent.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::{TransactionStatus, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
        }
    }
}

impl From<TransactionStatus> for PaymentStatus {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Pending => PaymentStatus::Pending,
            TransactionStatus::Completed => PaymentStatus::Completed,
            TransactionStatus::Failed => PaymentStatus::Failed,
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Completed" => Ok(PaymentStatus::Completed),
            "Failed" => Ok(PaymentStatus::Failed),
            other => Err(UnknownVariant::new("payment status", other)),
        }
    }
}

/// Correlation anchor between a transaction and the processor's intent id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub transaction_id: Uuid,
    pub beneficiary: String,
    pub amount: BigDecimal,
    pub source_wallet_id: Uuid,
    pub source_currency: String,
    pub destination_currency: String,
    pub fx_rate: BigDecimal,
    pub fee: BigDecimal,
    pub settlement_amount: BigDecimal,
    pub external_ref: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub owner_id: Uuid,
    pub transaction_id: Uuid,
    pub beneficiary: String,
    pub amount: BigDecimal,
    pub source_wallet_id: Uuid,
    pub source_currency: String,
    pub destination_currency: String,
    pub fx_rate: BigDecimal,
    pub fee: BigDecimal,
    pub settlement_amount: BigDecimal,
    pub external_ref: String,
}

impl NewPayment {
    pub fn into_payment(self) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            transaction_id: self.transaction_id,
            beneficiary: self.beneficiary,
            amount: self.amount,
            source_wallet_id: self.source_wallet_id,
            source_currency: self.source_currency,
            destination_currency: self.destination_currency,
            fx_rate: self.fx_rate,
            fee: self.fee,
            settlement_amount: self.settlement_amount,
            external_ref: self.external_ref,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
