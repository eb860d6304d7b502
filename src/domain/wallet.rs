//! Wallet domain entity: one balance per (owner, currency).

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletStatus {
    Active,
    Pending,
    Disabled,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::Active => "Active",
            WalletStatus::Pending => "Pending",
            WalletStatus::Disabled => "Disabled",
        }
    }
}

impl fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(WalletStatus::Active),
            "Pending" => Ok(WalletStatus::Pending),
            "Disabled" => Ok(WalletStatus::Disabled),
            other => Err(UnknownVariant::new("wallet status", other)),
        }
    }
}

/// Domain entity representing a wallet.
///
/// The balance is never assigned from caller input; it only moves through the
/// store's reserve/release/credit operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub currency: String,
    pub balance: BigDecimal,
    pub status: WalletStatus,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(owner_id: Uuid, currency: &str, is_primary: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            currency: currency.to_uppercase(),
            balance: BigDecimal::from(0),
            status: WalletStatus::Active,
            is_primary,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == WalletStatus::Active
    }
}
