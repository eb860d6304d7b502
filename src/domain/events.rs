//! Notifications produced by ledger operations.
//!
//! Operations return the events they want emitted instead of pushing them to a
//! socket themselves; the caller dispatches them once the work is committed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{Payment, Transaction, Wallet};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum LedgerEvent {
    WalletCreated(Wallet),
    WalletUpdated(Wallet),
    TransactionCreated(Transaction),
    TransactionUpdated(Transaction),
    PaymentUpdated(Payment),
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::WalletCreated(_) => "walletCreated",
            LedgerEvent::WalletUpdated(_) => "walletUpdated",
            LedgerEvent::TransactionCreated(_) => "transactionCreated",
            LedgerEvent::TransactionUpdated(_) => "transactionUpdated",
            LedgerEvent::PaymentUpdated(_) => "paymentUpdated",
        }
    }
}

/// An event addressed to a single owner's update channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerEvent {
    pub owner_id: Uuid,
    #[serde(flatten)]
    pub event: LedgerEvent,
    pub timestamp: DateTime<Utc>,
}

impl OwnerEvent {
    pub fn new(owner_id: Uuid, event: LedgerEvent) -> Self {
        Self {
            owner_id,
            event,
            timestamp: Utc::now(),
        }
    }
}

/// Result of an operation plus the events it asks the caller to emit.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub events: Vec<OwnerEvent>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, owner_id: Uuid, event: LedgerEvent) {
        self.events.push(OwnerEvent::new(owner_id, event));
    }

    pub fn with_event(mut self, owner_id: Uuid, event: LedgerEvent) -> Self {
        self.emit(owner_id, event);
        self
    }
}
