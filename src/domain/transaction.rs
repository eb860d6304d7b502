//! Transaction domain entity.
//! Framework-agnostic representation of a wallet movement.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::money::{is_negative, is_positive};
use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Payment,
    Fund,
    Withdraw,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Payment => "PAYMENT",
            TransactionType::Fund => "FUND",
            TransactionType::Withdraw => "WITHDRAW",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PAYMENT" => Ok(TransactionType::Payment),
            "FUND" => Ok(TransactionType::Fund),
            "WITHDRAW" => Ok(TransactionType::Withdraw),
            _ => Err(UnknownVariant::new("transaction type", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Completed => "Completed",
            TransactionStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Pending is the only state with outgoing edges.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        *self == TransactionStatus::Pending && next.is_terminal()
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(UnknownVariant::new("transaction status", s)),
        }
    }
}

/// Domain entity representing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub wallet_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub settlement_amount: BigDecimal,
    pub source_currency: String,
    pub destination_currency: Option<String>,
    pub fx_rate: BigDecimal,
    pub status: TransactionStatus,
    pub beneficiary: Option<String>,
    pub funding_account: Option<String>,
    pub external_ref: Option<String>,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Amount that was taken from the wallet when this transaction was opened.
    pub fn total_debit(&self) -> BigDecimal {
        &self.amount + &self.fee
    }
}

/// Fields required to open a Pending transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub owner_id: Uuid,
    pub wallet_id: Uuid,
    pub kind: TransactionType,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub settlement_amount: BigDecimal,
    pub source_currency: String,
    pub destination_currency: Option<String>,
    pub fx_rate: BigDecimal,
    pub beneficiary: Option<String>,
    pub funding_account: Option<String>,
}

impl NewTransaction {
    /// Checks the record-level invariants every store enforces on insert.
    pub fn validate(&self) -> Result<(), String> {
        if !is_positive(&self.amount) {
            return Err("amount must be greater than zero".to_string());
        }
        if is_negative(&self.fee) {
            return Err("fee must not be negative".to_string());
        }
        if !is_positive(&self.fx_rate) {
            return Err("fxRate must be greater than zero".to_string());
        }
        if self.kind == TransactionType::Payment
            && self
                .destination_currency
                .as_deref()
                .map_or(true, |c| c.trim().is_empty())
        {
            return Err("destinationCurrency is required for payments".to_string());
        }
        Ok(())
    }

    pub fn into_transaction(self) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            wallet_id: self.wallet_id,
            kind: self.kind,
            amount: self.amount,
            fee: self.fee,
            settlement_amount: self.settlement_amount,
            source_currency: self.source_currency,
            destination_currency: self.destination_currency,
            fx_rate: self.fx_rate,
            status: TransactionStatus::Pending,
            beneficiary: self.beneficiary,
            funding_account: self.funding_account,
            external_ref: None,
            payment_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Optional filters for listing an owner's transactions.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub kind: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.kind.map_or(true, |k| tx.kind == k)
            && self.status.map_or(true, |s| tx.status == s)
            && self.start.map_or(true, |start| tx.created_at >= start)
            && self.end.map_or(true, |end| tx.created_at <= end)
    }
}
