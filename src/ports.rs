//! Storage port for the ledger.
//!
//! Every balance mutation goes through [`LedgerStore::reserve`],
//! [`LedgerStore::release`], [`LedgerStore::credit`] or
//! [`LedgerStore::settle_transaction`]; implementations must make the balance
//! check and the write a single atomic step.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    NewPayment, NewTransaction, Payment, PaymentStatus, Transaction, TransactionFilter,
    TransactionStatus, Wallet,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("wallet {0} not found")]
    WalletNotFound(Uuid),

    #[error("wallet {0} is not active")]
    WalletInactive(Uuid),

    #[error("insufficient balance in wallet {wallet_id}: available {available}, requested {requested}")]
    InsufficientBalance {
        wallet_id: Uuid,
        available: BigDecimal,
        requested: BigDecimal,
    },

    #[error("transaction {0} not found")]
    TransactionNotFound(Uuid),

    #[error("payment {0} not found")]
    PaymentNotFound(Uuid),

    #[error("transaction {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Terminal transition applied by the webhook reconciler.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub status: TransactionStatus,
    /// Amount to add back to (or credit into) the transaction's wallet in the
    /// same atomic step as the status change.
    pub wallet_credit: Option<BigDecimal>,
}

#[derive(Debug, Clone)]
pub struct SettledTransaction {
    pub transaction: Transaction,
    pub wallet: Option<Wallet>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // --- wallets ---

    /// Creates an Active, zero-balance wallet. The owner's first wallet becomes
    /// primary. Fails with `Conflict` if (owner, currency) already exists.
    async fn create_wallet(&self, owner_id: Uuid, currency: &str) -> StoreResult<Wallet>;

    async fn get_wallet(&self, wallet_id: Uuid) -> StoreResult<Option<Wallet>>;

    async fn find_wallet(&self, owner_id: Uuid, currency: &str) -> StoreResult<Option<Wallet>>;

    async fn list_wallets(&self, owner_id: Uuid) -> StoreResult<Vec<Wallet>>;

    async fn reserve(&self, wallet_id: Uuid, amount: &BigDecimal) -> StoreResult<Wallet>;

    async fn release(&self, wallet_id: Uuid, amount: &BigDecimal) -> StoreResult<Wallet>;

    async fn credit(&self, wallet_id: Uuid, amount: &BigDecimal) -> StoreResult<Wallet>;

    // --- transactions ---

    async fn create_transaction(&self, new: NewTransaction) -> StoreResult<Transaction>;

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    async fn find_transaction_by_external_ref(
        &self,
        external_ref: &str,
    ) -> StoreResult<Option<Transaction>>;

    async fn list_transactions(
        &self,
        owner_id: Uuid,
        filter: &TransactionFilter,
    ) -> StoreResult<Vec<Transaction>>;

    async fn attach_external_ref(
        &self,
        id: Uuid,
        external_ref: &str,
        payment_id: Option<Uuid>,
    ) -> StoreResult<Transaction>;

    async fn transition_transaction(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> StoreResult<Transaction>;

    /// Transitions a Pending transaction and applies the wallet credit, if any,
    /// atomically. Fails with `InvalidTransition` when the transaction is
    /// already terminal, leaving the wallet untouched.
    async fn settle_transaction(
        &self,
        id: Uuid,
        settlement: Settlement,
    ) -> StoreResult<SettledTransaction>;

    /// Deletes a Pending transaction together with its payment and credits
    /// `refund` back to its wallet, all in one atomic step. Returns `false`
    /// and changes nothing when the transaction is missing or already
    /// terminal.
    async fn discard_pending_transaction(
        &self,
        id: Uuid,
        refund: Option<BigDecimal>,
    ) -> StoreResult<bool>;

    // --- payments ---

    async fn create_payment(&self, new: NewPayment) -> StoreResult<Payment>;

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>>;

    async fn find_payment_by_external_ref(&self, external_ref: &str)
        -> StoreResult<Option<Payment>>;

    async fn set_payment_status(&self, id: Uuid, status: PaymentStatus) -> StoreResult<Payment>;

    /// Lightweight liveness check used by the health endpoint.
    async fn ping(&self) -> StoreResult<()>;
}
