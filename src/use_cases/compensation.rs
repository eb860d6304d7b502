//! Best-effort undo of the steps an operation already applied.

use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::ports::LedgerStore;

/// What a rollback actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Reserved funds returned and records removed, or nothing to undo.
    Reverted,
    /// A webhook settled the transaction first; it owns the wallet adjustment
    /// and the records stay.
    LeftSettled,
    /// A store call failed; details are in the logs.
    Incomplete,
}

/// Records applied steps so they can be reversed if a later step fails.
/// Failures while compensating are logged and never returned; the error that
/// triggered the rollback stays authoritative.
#[derive(Debug, Default)]
pub struct Compensation {
    reserved: Option<(Uuid, BigDecimal)>,
    transaction_id: Option<Uuid>,
}

impl Compensation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserved(&mut self, wallet_id: Uuid, amount: BigDecimal) {
        self.reserved = Some((wallet_id, amount));
    }

    pub fn transaction_created(&mut self, id: Uuid) {
        self.transaction_id = Some(id);
    }

    pub async fn rollback(self, store: &dyn LedgerStore) -> RollbackOutcome {
        let Some(id) = self.transaction_id else {
            // Nothing recorded yet besides the reservation.
            let Some((wallet_id, amount)) = self.reserved else {
                return RollbackOutcome::Reverted;
            };
            return match store.release(wallet_id, &amount).await {
                Ok(_) => {
                    tracing::info!(%wallet_id, %amount, "Released reserved funds");
                    RollbackOutcome::Reverted
                }
                Err(e) => {
                    tracing::error!(%wallet_id, %amount, error = %e, "Rollback release failed");
                    RollbackOutcome::Incomplete
                }
            };
        };

        // The refund rides on the Pending-only delete, so a webhook that
        // settles the transaction concurrently cannot be refunded twice.
        let refund = self.reserved.map(|(_, amount)| amount);
        match store.discard_pending_transaction(id, refund.clone()).await {
            Ok(true) => {
                tracing::info!(transaction_id = %id, refund = ?refund, "Rolled back pending transaction");
                RollbackOutcome::Reverted
            }
            Ok(false) => {
                tracing::warn!(
                    transaction_id = %id,
                    "Transaction settled before rollback, leaving it in place"
                );
                RollbackOutcome::LeftSettled
            }
            Err(e) => {
                tracing::error!(transaction_id = %id, error = %e, "Rollback failed");
                RollbackOutcome::Incomplete
            }
        }
    }
}
