//! Framework-agnostic ledger entities.

pub mod events;
pub mod money;
pub mod payment;
pub mod transaction;
pub mod wallet;

pub use events::{LedgerEvent, OwnerEvent, Outcome};
pub use payment::{NewPayment, Payment, PaymentStatus};
pub use transaction::{
    NewTransaction, Transaction, TransactionFilter, TransactionStatus, TransactionType,
};
pub use wallet::{Wallet, WalletStatus};

use std::fmt;

/// Error returned when a stored enum label does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}
