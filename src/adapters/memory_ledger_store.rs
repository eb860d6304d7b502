//! In-process implementation of LedgerStore.
//!
//! All tables live behind one mutex, so every operation is linearizable. Used
//! when no `DATABASE_URL` is configured and throughout the test suite.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    NewPayment, NewTransaction, Payment, PaymentStatus, Transaction, TransactionFilter,
    TransactionStatus, Wallet,
};
use crate::ports::{LedgerStore, SettledTransaction, Settlement, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    wallets: HashMap<Uuid, Wallet>,
    transactions: HashMap<Uuid, Transaction>,
    payments: HashMap<Uuid, Payment>,
}

impl Tables {
    fn wallet_mut(&mut self, wallet_id: Uuid) -> StoreResult<&mut Wallet> {
        self.wallets
            .get_mut(&wallet_id)
            .ok_or(StoreError::WalletNotFound(wallet_id))
    }

    fn transaction_mut(&mut self, id: Uuid) -> StoreResult<&mut Transaction> {
        self.transactions
            .get_mut(&id)
            .ok_or(StoreError::TransactionNotFound(id))
    }

    fn add_to_balance(&mut self, wallet_id: Uuid, amount: &BigDecimal) -> StoreResult<Wallet> {
        let wallet = self.wallet_mut(wallet_id)?;
        wallet.balance = &wallet.balance + amount;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    fn transition(&mut self, id: Uuid, status: TransactionStatus) -> StoreResult<Transaction> {
        let tx = self.transaction_mut(id)?;
        if !tx.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: tx.status,
                to: status,
            });
        }
        tx.status = status;
        tx.updated_at = Utc::now();
        Ok(tx.clone())
    }
}

#[derive(Default)]
pub struct InMemoryLedgerStore {
    tables: Mutex<Tables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a wallet's status. Administrative path, not part of the port.
    pub async fn set_wallet_status(
        &self,
        wallet_id: Uuid,
        status: crate::domain::WalletStatus,
    ) -> StoreResult<Wallet> {
        let mut tables = self.tables.lock().await;
        let wallet = tables.wallet_mut(wallet_id)?;
        wallet.status = status;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create_wallet(&self, owner_id: Uuid, currency: &str) -> StoreResult<Wallet> {
        let currency = currency.to_uppercase();
        let mut tables = self.tables.lock().await;

        let owned: Vec<&Wallet> = tables
            .wallets
            .values()
            .filter(|w| w.owner_id == owner_id)
            .collect();
        if owned.iter().any(|w| w.currency == currency) {
            return Err(StoreError::Conflict(format!(
                "Wallet for {} already exists",
                currency
            )));
        }

        let wallet = Wallet::new(owner_id, &currency, owned.is_empty());
        tables.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn get_wallet(&self, wallet_id: Uuid) -> StoreResult<Option<Wallet>> {
        Ok(self.tables.lock().await.wallets.get(&wallet_id).cloned())
    }

    async fn find_wallet(&self, owner_id: Uuid, currency: &str) -> StoreResult<Option<Wallet>> {
        let currency = currency.to_uppercase();
        Ok(self
            .tables
            .lock()
            .await
            .wallets
            .values()
            .find(|w| w.owner_id == owner_id && w.currency == currency)
            .cloned())
    }

    async fn list_wallets(&self, owner_id: Uuid) -> StoreResult<Vec<Wallet>> {
        let mut wallets: Vec<Wallet> = self
            .tables
            .lock()
            .await
            .wallets
            .values()
            .filter(|w| w.owner_id == owner_id)
            .cloned()
            .collect();
        wallets.sort_by_key(|w| w.created_at);
        Ok(wallets)
    }

    async fn reserve(&self, wallet_id: Uuid, amount: &BigDecimal) -> StoreResult<Wallet> {
        let mut tables = self.tables.lock().await;
        let wallet = tables.wallet_mut(wallet_id)?;

        if !wallet.is_active() {
            return Err(StoreError::WalletInactive(wallet_id));
        }
        if &wallet.balance < amount {
            return Err(StoreError::InsufficientBalance {
                wallet_id,
                available: wallet.balance.clone(),
                requested: amount.clone(),
            });
        }

        wallet.balance = &wallet.balance - amount;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn release(&self, wallet_id: Uuid, amount: &BigDecimal) -> StoreResult<Wallet> {
        self.tables.lock().await.add_to_balance(wallet_id, amount)
    }

    async fn credit(&self, wallet_id: Uuid, amount: &BigDecimal) -> StoreResult<Wallet> {
        self.tables.lock().await.add_to_balance(wallet_id, amount)
    }

    async fn create_transaction(&self, new: NewTransaction) -> StoreResult<Transaction> {
        new.validate().map_err(StoreError::Validation)?;
        let tx = new.into_transaction();
        self.tables
            .lock()
            .await
            .transactions
            .insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        Ok(self.tables.lock().await.transactions.get(&id).cloned())
    }

    async fn find_transaction_by_external_ref(
        &self,
        external_ref: &str,
    ) -> StoreResult<Option<Transaction>> {
        Ok(self
            .tables
            .lock()
            .await
            .transactions
            .values()
            .find(|t| t.external_ref.as_deref() == Some(external_ref))
            .cloned())
    }

    async fn list_transactions(
        &self,
        owner_id: Uuid,
        filter: &TransactionFilter,
    ) -> StoreResult<Vec<Transaction>> {
        let mut txs: Vec<Transaction> = self
            .tables
            .lock()
            .await
            .transactions
            .values()
            .filter(|t| t.owner_id == owner_id && filter.matches(t))
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(txs)
    }

    async fn attach_external_ref(
        &self,
        id: Uuid,
        external_ref: &str,
        payment_id: Option<Uuid>,
    ) -> StoreResult<Transaction> {
        let mut tables = self.tables.lock().await;
        let tx = tables.transaction_mut(id)?;
        tx.external_ref = Some(external_ref.to_string());
        if payment_id.is_some() {
            tx.payment_id = payment_id;
        }
        tx.updated_at = Utc::now();
        Ok(tx.clone())
    }

    async fn transition_transaction(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> StoreResult<Transaction> {
        self.tables.lock().await.transition(id, status)
    }

    async fn settle_transaction(
        &self,
        id: Uuid,
        settlement: Settlement,
    ) -> StoreResult<SettledTransaction> {
        let mut tables = self.tables.lock().await;

        // Check the wallet before mutating anything so a failure leaves both
        // records unchanged.
        let wallet_id = tables
            .transactions
            .get(&id)
            .map(|t| t.wallet_id)
            .ok_or(StoreError::TransactionNotFound(id))?;
        if settlement.wallet_credit.is_some() && !tables.wallets.contains_key(&wallet_id) {
            return Err(StoreError::WalletNotFound(wallet_id));
        }

        let transaction = tables.transition(id, settlement.status)?;
        let wallet = match settlement.wallet_credit {
            Some(amount) => Some(tables.add_to_balance(wallet_id, &amount)?),
            None => None,
        };

        Ok(SettledTransaction {
            transaction,
            wallet,
        })
    }

    async fn discard_pending_transaction(
        &self,
        id: Uuid,
        refund: Option<BigDecimal>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let wallet_id = match tables.transactions.get(&id) {
            Some(tx) if tx.status == TransactionStatus::Pending => tx.wallet_id,
            _ => return Ok(false),
        };
        if refund.is_some() && !tables.wallets.contains_key(&wallet_id) {
            return Err(StoreError::WalletNotFound(wallet_id));
        }

        tables.transactions.remove(&id);
        tables.payments.retain(|_, p| p.transaction_id != id);
        if let Some(amount) = refund {
            tables.add_to_balance(wallet_id, &amount)?;
        }
        Ok(true)
    }

    async fn create_payment(&self, new: NewPayment) -> StoreResult<Payment> {
        let mut tables = self.tables.lock().await;
        if tables
            .payments
            .values()
            .any(|p| p.external_ref == new.external_ref)
        {
            return Err(StoreError::Conflict(format!(
                "payment with external reference {} already exists",
                new.external_ref
            )));
        }
        let payment = new.into_payment();
        tables.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.tables.lock().await.payments.get(&id).cloned())
    }

    async fn find_payment_by_external_ref(
        &self,
        external_ref: &str,
    ) -> StoreResult<Option<Payment>> {
        Ok(self
            .tables
            .lock()
            .await
            .payments
            .values()
            .find(|p| p.external_ref == external_ref)
            .cloned())
    }

    async fn set_payment_status(&self, id: Uuid, status: PaymentStatus) -> StoreResult<Payment> {
        let mut tables = self.tables.lock().await;
        let payment = tables
            .payments
            .get_mut(&id)
            .ok_or(StoreError::PaymentNotFound(id))?;
        payment.status = status;
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
