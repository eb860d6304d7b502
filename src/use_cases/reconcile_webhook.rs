//! Applies processor notifications to Pending transactions.
//!
//! Each notification drives at most one terminal transition. Redelivered or
//! out-of-order events find the transaction already terminal and do nothing.

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{LedgerEvent, Outcome, Transaction, TransactionStatus, TransactionType};
use crate::ports::{LedgerStore, Settlement, StoreError, StoreResult};
use crate::processor::ProcessorEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventFamily {
    PaymentIntent,
    Payout,
}

/// Maps a processor event type to the terminal status it implies.
fn classify(kind: &str) -> Option<(EventFamily, TransactionStatus)> {
    match kind {
        "payment_intent.succeeded" => Some((EventFamily::PaymentIntent, TransactionStatus::Completed)),
        "payment_intent.payment_failed" | "payment_intent.canceled" => {
            Some((EventFamily::PaymentIntent, TransactionStatus::Failed))
        }
        "payout.paid" => Some((EventFamily::Payout, TransactionStatus::Completed)),
        "payout.failed" | "payout.canceled" => Some((EventFamily::Payout, TransactionStatus::Failed)),
        _ => None,
    }
}

fn family_matches(family: EventFamily, kind: TransactionType) -> bool {
    match family {
        EventFamily::PaymentIntent => {
            matches!(kind, TransactionType::Payment | TransactionType::Fund)
        }
        EventFamily::Payout => kind == TransactionType::Withdraw,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    UnhandledEventType,
    TransactionNotFound,
    AlreadySettled,
    ReferenceMismatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Applied {
        transaction_id: Uuid,
        status: TransactionStatus,
    },
    Ignored(IgnoreReason),
}

pub struct WebhookReconciler {
    store: Arc<dyn LedgerStore>,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.kind))]
    pub async fn reconcile(&self, event: &ProcessorEvent) -> StoreResult<Outcome<Reconciliation>> {
        let Some((family, status)) = classify(&event.kind) else {
            tracing::info!("Unhandled processor event acknowledged");
            return Ok(Outcome::new(Reconciliation::Ignored(IgnoreReason::UnhandledEventType)));
        };

        let Some(transaction) = self.locate(event).await? else {
            tracing::warn!(object_id = ?event.object_id(), "No transaction for processor event");
            return Ok(Outcome::new(Reconciliation::Ignored(IgnoreReason::TransactionNotFound)));
        };

        if !family_matches(family, transaction.kind) || !reference_matches(&transaction, event) {
            tracing::warn!(
                transaction_id = %transaction.id,
                external_ref = ?transaction.external_ref,
                object_id = ?event.object_id(),
                "Processor event does not belong to the located transaction"
            );
            return Ok(Outcome::new(Reconciliation::Ignored(IgnoreReason::ReferenceMismatch)));
        }

        if transaction.status.is_terminal() {
            tracing::info!(transaction_id = %transaction.id, status = %transaction.status, "Duplicate delivery ignored");
            return Ok(Outcome::new(Reconciliation::Ignored(IgnoreReason::AlreadySettled)));
        }

        let settlement = Settlement {
            status,
            wallet_credit: wallet_adjustment(&transaction, status),
        };

        let settled = match self.store.settle_transaction(transaction.id, settlement).await {
            Ok(settled) => settled,
            // Lost the compare-and-set to a concurrent delivery.
            Err(StoreError::InvalidTransition { .. }) => {
                return Ok(Outcome::new(Reconciliation::Ignored(IgnoreReason::AlreadySettled)));
            }
            Err(e) => return Err(e),
        };

        let owner_id = settled.transaction.owner_id;
        let mut outcome = Outcome::new(Reconciliation::Applied {
            transaction_id: settled.transaction.id,
            status,
        });
        outcome.emit(owner_id, LedgerEvent::TransactionUpdated(settled.transaction.clone()));
        if let Some(wallet) = settled.wallet {
            outcome.emit(owner_id, LedgerEvent::WalletUpdated(wallet));
        }

        if let Some(payment_id) = settled.transaction.payment_id {
            match self.store.set_payment_status(payment_id, status.into()).await {
                Ok(payment) => outcome.emit(owner_id, LedgerEvent::PaymentUpdated(payment)),
                Err(e) => {
                    tracing::error!(%payment_id, error = %e, "Failed to mirror payment status")
                }
            }
        }

        tracing::info!(transaction_id = %settled.transaction.id, %status, "Transaction settled");
        Ok(outcome)
    }

    /// Correlation id from metadata first, then the processor object id as an
    /// external reference on the transaction or its payment.
    async fn locate(&self, event: &ProcessorEvent) -> StoreResult<Option<Transaction>> {
        if let Some(id) = event
            .metadata("transactionId")
            .and_then(|raw| Uuid::parse_str(raw).ok())
        {
            if let Some(tx) = self.store.get_transaction(id).await? {
                return Ok(Some(tx));
            }
        }

        let Some(object_id) = event.object_id() else {
            return Ok(None);
        };

        if let Some(tx) = self.store.find_transaction_by_external_ref(object_id).await? {
            return Ok(Some(tx));
        }

        match self.store.find_payment_by_external_ref(object_id).await? {
            Some(payment) => self.store.get_transaction(payment.transaction_id).await,
            None => Ok(None),
        }
    }
}

fn reference_matches(transaction: &Transaction, event: &ProcessorEvent) -> bool {
    match (transaction.external_ref.as_deref(), event.object_id()) {
        (Some(stored), Some(incoming)) => stored == incoming,
        _ => true,
    }
}

/// FUND success credits the wallet. PAYMENT and WITHDRAW reserved their
/// funds up front, so only a failure touches the wallet, returning
/// `amount + fee`.
fn wallet_adjustment(
    transaction: &Transaction,
    status: TransactionStatus,
) -> Option<bigdecimal::BigDecimal> {
    match (transaction.kind, status) {
        (TransactionType::Fund, TransactionStatus::Completed) => Some(transaction.amount.clone()),
        (TransactionType::Payment | TransactionType::Withdraw, TransactionStatus::Failed) => {
            Some(transaction.total_debit())
        }
        _ => None,
    }
}
