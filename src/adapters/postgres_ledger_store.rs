//! Postgres implementation of LedgerStore.
//!
//! Balance checks are folded into conditional `UPDATE ... RETURNING`
//! statements, so concurrent reservations against one wallet serialize on
//! the row lock and can never overdraw it.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::models::{PaymentRow, TransactionRow, WalletRow};
use crate::domain::{
    NewPayment, NewTransaction, Payment, PaymentStatus, Transaction, TransactionFilter,
    TransactionStatus, Wallet, WalletStatus,
};
use crate::ports::{LedgerStore, SettledTransaction, Settlement, StoreError, StoreResult};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explains why a conditional wallet update matched no row.
    async fn classify_wallet_miss(&self, wallet_id: Uuid, requested: &BigDecimal) -> StoreError {
        match self.get_wallet(wallet_id).await {
            Ok(None) => StoreError::WalletNotFound(wallet_id),
            Ok(Some(w)) if !w.is_active() => StoreError::WalletInactive(wallet_id),
            Ok(Some(w)) => StoreError::InsufficientBalance {
                wallet_id,
                available: w.balance,
                requested: requested.clone(),
            },
            Err(e) => e,
        }
    }

    async fn transition_miss(&self, id: Uuid, to: TransactionStatus) -> StoreError {
        match self.get_transaction(id).await {
            Ok(None) => StoreError::TransactionNotFound(id),
            Ok(Some(tx)) => StoreError::InvalidTransition {
                id,
                from: tx.status,
                to,
            },
            Err(e) => e,
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn create_wallet(&self, owner_id: Uuid, currency: &str) -> StoreResult<Wallet> {
        let currency = currency.to_uppercase();
        let wallet = Wallet::new(owner_id, &currency, false);

        let row = sqlx::query_as::<_, WalletRow>(
            r#"
            INSERT INTO wallets (id, owner_id, currency, balance, status, is_primary, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5,
                    NOT EXISTS (SELECT 1 FROM wallets WHERE owner_id = $2),
                    $6, $7)
            RETURNING *
            "#,
        )
        .bind(wallet.id)
        .bind(owner_id)
        .bind(&currency)
        .bind(&wallet.balance)
        .bind(WalletStatus::Active.as_str())
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("Wallet for {} already exists", currency))
            } else {
                StoreError::from(e)
            }
        })?;

        Wallet::try_from(row)
    }

    async fn get_wallet(&self, wallet_id: Uuid) -> StoreResult<Option<Wallet>> {
        sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE id = $1")
            .bind(wallet_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Wallet::try_from)
            .transpose()
    }

    async fn find_wallet(&self, owner_id: Uuid, currency: &str) -> StoreResult<Option<Wallet>> {
        sqlx::query_as::<_, WalletRow>(
            "SELECT * FROM wallets WHERE owner_id = $1 AND currency = $2",
        )
        .bind(owner_id)
        .bind(currency.to_uppercase())
        .fetch_optional(&self.pool)
        .await?
        .map(Wallet::try_from)
        .transpose()
    }

    async fn list_wallets(&self, owner_id: Uuid) -> StoreResult<Vec<Wallet>> {
        sqlx::query_as::<_, WalletRow>(
            "SELECT * FROM wallets WHERE owner_id = $1 ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Wallet::try_from)
        .collect()
    }

    async fn reserve(&self, wallet_id: Uuid, amount: &BigDecimal) -> StoreResult<Wallet> {
        let row = sqlx::query_as::<_, WalletRow>(
            r#"
            UPDATE wallets
            SET balance = balance - $2, updated_at = NOW()
            WHERE id = $1 AND status = $3 AND balance >= $2
            RETURNING *
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .bind(WalletStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Wallet::try_from(row),
            None => Err(self.classify_wallet_miss(wallet_id, amount).await),
        }
    }

    async fn release(&self, wallet_id: Uuid, amount: &BigDecimal) -> StoreResult<Wallet> {
        self.credit(wallet_id, amount).await
    }

    async fn credit(&self, wallet_id: Uuid, amount: &BigDecimal) -> StoreResult<Wallet> {
        sqlx::query_as::<_, WalletRow>(
            r#"
            UPDATE wallets SET balance = balance + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::WalletNotFound(wallet_id))
        .and_then(Wallet::try_from)
    }

    async fn create_transaction(&self, new: NewTransaction) -> StoreResult<Transaction> {
        new.validate().map_err(StoreError::Validation)?;
        let tx = new.into_transaction();

        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (
                id, owner_id, wallet_id, type, amount, fee, settlement_amount,
                source_currency, destination_currency, fx_rate, status,
                beneficiary, funding_account, external_ref, payment_id,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *
            "#,
        )
        .bind(tx.id)
        .bind(tx.owner_id)
        .bind(tx.wallet_id)
        .bind(tx.kind.as_str())
        .bind(&tx.amount)
        .bind(&tx.fee)
        .bind(&tx.settlement_amount)
        .bind(&tx.source_currency)
        .bind(&tx.destination_currency)
        .bind(&tx.fx_rate)
        .bind(tx.status.as_str())
        .bind(&tx.beneficiary)
        .bind(&tx.funding_account)
        .bind(&tx.external_ref)
        .bind(tx.payment_id)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Transaction::try_from(row)
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn find_transaction_by_external_ref(
        &self,
        external_ref: &str,
    ) -> StoreResult<Option<Transaction>> {
        sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE external_ref = $1")
            .bind(external_ref)
            .fetch_optional(&self.pool)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn list_transactions(
        &self,
        owner_id: Uuid,
        filter: &TransactionFilter,
    ) -> StoreResult<Vec<Transaction>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM transactions WHERE owner_id = ");
        query.push_bind(owner_id);

        if let Some(kind) = filter.kind {
            query.push(" AND type = ").push_bind(kind.as_str());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(start) = filter.start {
            query.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end {
            query.push(" AND created_at <= ").push_bind(end);
        }
        query.push(" ORDER BY created_at DESC");

        query
            .build_query_as::<TransactionRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    async fn attach_external_ref(
        &self,
        id: Uuid,
        external_ref: &str,
        payment_id: Option<Uuid>,
    ) -> StoreResult<Transaction> {
        sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET external_ref = $2, payment_id = COALESCE($3, payment_id), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(external_ref)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("external reference {} already in use", external_ref))
            } else {
                StoreError::from(e)
            }
        })?
        .ok_or(StoreError::TransactionNotFound(id))
        .and_then(Transaction::try_from)
    }

    async fn transition_transaction(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> StoreResult<Transaction> {
        if !TransactionStatus::Pending.can_transition_to(status) {
            return Err(self.transition_miss(id, status).await);
        }

        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = $3
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(TransactionStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Transaction::try_from(row),
            None => Err(self.transition_miss(id, status).await),
        }
    }

    async fn settle_transaction(
        &self,
        id: Uuid,
        settlement: Settlement,
    ) -> StoreResult<SettledTransaction> {
        if !TransactionStatus::Pending.can_transition_to(settlement.status) {
            return Err(self.transition_miss(id, settlement.status).await);
        }

        let mut db_tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = $3
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(settlement.status.as_str())
        .bind(TransactionStatus::Pending.as_str())
        .fetch_optional(&mut *db_tx)
        .await?;

        let Some(row) = row else {
            db_tx.rollback().await?;
            return Err(self.transition_miss(id, settlement.status).await);
        };
        let transaction = Transaction::try_from(row)?;

        let wallet = match &settlement.wallet_credit {
            Some(amount) => {
                let row = sqlx::query_as::<_, WalletRow>(
                    r#"
                    UPDATE wallets SET balance = balance + $2, updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(transaction.wallet_id)
                .bind(amount)
                .fetch_optional(&mut *db_tx)
                .await?;
                match row {
                    Some(row) => Some(Wallet::try_from(row)?),
                    None => {
                        db_tx.rollback().await?;
                        return Err(StoreError::WalletNotFound(transaction.wallet_id));
                    }
                }
            }
            None => None,
        };

        db_tx.commit().await?;
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
        let mut db_tx = self.pool.begin().await?;

        // Payments cascade with their transaction.
        let wallet_id: Option<Uuid> = sqlx::query_scalar(
            "DELETE FROM transactions WHERE id = $1 AND status = $2 RETURNING wallet_id",
        )
        .bind(id)
        .bind(TransactionStatus::Pending.as_str())
        .fetch_optional(&mut *db_tx)
        .await?;

        let Some(wallet_id) = wallet_id else {
            db_tx.rollback().await?;
            return Ok(false);
        };

        if let Some(amount) = &refund {
            let updated = sqlx::query(
                "UPDATE wallets SET balance = balance + $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(wallet_id)
            .bind(amount)
            .execute(&mut *db_tx)
            .await?;
            if updated.rows_affected() == 0 {
                db_tx.rollback().await?;
                return Err(StoreError::WalletNotFound(wallet_id));
            }
        }

        db_tx.commit().await?;
        Ok(true)
    }

    async fn create_payment(&self, new: NewPayment) -> StoreResult<Payment> {
        let payment = new.into_payment();

        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            INSERT INTO payments (
                id, owner_id, transaction_id, beneficiary, amount, source_wallet_id,
                source_currency, destination_currency, fx_rate, fee, settlement_amount,
                external_ref, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(payment.id)
        .bind(payment.owner_id)
        .bind(payment.transaction_id)
        .bind(&payment.beneficiary)
        .bind(&payment.amount)
        .bind(payment.source_wallet_id)
        .bind(&payment.source_currency)
        .bind(&payment.destination_currency)
        .bind(&payment.fx_rate)
        .bind(&payment.fee)
        .bind(&payment.settlement_amount)
        .bind(&payment.external_ref)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "payment with external reference {} already exists",
                    payment.external_ref
                ))
            } else {
                StoreError::from(e)
            }
        })?;

        Payment::try_from(row)
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Payment::try_from)
            .transpose()
    }

    async fn find_payment_by_external_ref(
        &self,
        external_ref: &str,
    ) -> StoreResult<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE external_ref = $1")
            .bind(external_ref)
            .fetch_optional(&self.pool)
            .await?
            .map(Payment::try_from)
            .transpose()
    }

    async fn set_payment_status(&self, id: Uuid, status: PaymentStatus) -> StoreResult<Payment> {
        sqlx::query_as::<_, PaymentRow>(
            "UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::PaymentNotFound(id))
        .and_then(Payment::try_from)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
