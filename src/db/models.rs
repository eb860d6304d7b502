//! Row types for SQLx. Statuses and types are stored as text and parsed back
//! into domain enums on read.

use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{Payment, Transaction, Wallet};
use crate::ports::StoreError;

#[derive(Debug, FromRow)]
pub struct WalletRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub currency: String,
    pub balance: BigDecimal,
    pub status: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = StoreError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        Ok(Wallet {
            id: row.id,
            owner_id: row.owner_id,
            currency: row.currency,
            balance: row.balance,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("wallet {}: {}", row.id, e)))?,
            is_primary: row.is_primary,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub wallet_id: Uuid,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub settlement_amount: BigDecimal,
    pub source_currency: String,
    pub destination_currency: Option<String>,
    pub fx_rate: BigDecimal,
    pub status: String,
    pub beneficiary: Option<String>,
    pub funding_account: Option<String>,
    pub external_ref: Option<String>,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt =
            |e: crate::domain::UnknownVariant| StoreError::Corrupt(format!("transaction {}: {}", id, e));
        Ok(Transaction {
            id: row.id,
            owner_id: row.owner_id,
            wallet_id: row.wallet_id,
            kind: row.kind.parse().map_err(corrupt)?,
            amount: row.amount,
            fee: row.fee,
            settlement_amount: row.settlement_amount,
            source_currency: row.source_currency,
            destination_currency: row.destination_currency,
            fx_rate: row.fx_rate,
            status: row.status.parse().map_err(corrupt)?,
            beneficiary: row.beneficiary,
            funding_account: row.funding_account,
            external_ref: row.external_ref,
            payment_id: row.payment_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct PaymentRow {
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
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            owner_id: row.owner_id,
            transaction_id: row.transaction_id,
            beneficiary: row.beneficiary,
            amount: row.amount,
            source_wallet_id: row.source_wallet_id,
            source_currency: row.source_currency,
            destination_currency: row.destination_currency,
            fx_rate: row.fx_rate,
            fee: row.fee,
            settlement_amount: row.settlement_amount,
            external_ref: row.external_ref,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("payment {}: {}", row.id, e)))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TransactionStatus, TransactionType, WalletStatus};

    fn transaction_row(kind: &str, status: &str) -> TransactionRow {
        let now = Utc::now();
        TransactionRow {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            kind: kind.to_string(),
            amount: BigDecimal::from(10),
            fee: BigDecimal::from(0),
            settlement_amount: BigDecimal::from(10),
            source_currency: "USD".to_string(),
            destination_currency: None,
            fx_rate: BigDecimal::from(1),
            status: status.to_string(),
            beneficiary: None,
            funding_account: None,
            external_ref: None,
            payment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn maps_transaction_row_to_domain() {
        let tx = Transaction::try_from(transaction_row("FUND", "Completed")).unwrap();
        assert_eq!(tx.kind, TransactionType::Fund);
        assert_eq!(tx.status, TransactionStatus::Completed);
    }

    #[test]
    fn unknown_status_is_reported_as_corrupt() {
        let err = Transaction::try_from(transaction_row("FUND", "Refunded")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn maps_wallet_row_status() {
        let now = Utc::now();
        let row = WalletRow {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            currency: "EUR".to_string(),
            balance: BigDecimal::from(3),
            status: "Disabled".to_string(),
            is_primary: false,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(Wallet::try_from(row).unwrap().status, WalletStatus::Disabled);
    }
}
