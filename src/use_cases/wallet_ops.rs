//! Wallet lifecycle: creation, processor-backed funding and withdrawals.

use bigdecimal::BigDecimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::compensation::Compensation;
use crate::config::currencies::CurrencyRegistry;
use crate::domain::money::{is_positive, round_money};
use crate::domain::{LedgerEvent, NewTransaction, Outcome, Transaction, TransactionType, Wallet};
use crate::ports::{LedgerStore, StoreError};
use crate::processor::{IntentRequest, PaymentProcessor, PayoutRequest, ProcessorError};

#[derive(Debug, Clone)]
pub struct FundWallet {
    pub wallet_id: Uuid,
    pub amount: BigDecimal,
    pub funding_account: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WithdrawFromWallet {
    pub wallet_id: Uuid,
    pub amount: BigDecimal,
    pub recipient: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FundingReceipt {
    #[schema(value_type = Object)]
    pub transaction: Transaction,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalReceipt {
    #[schema(value_type = Object)]
    pub wallet: Wallet,
    #[schema(value_type = Object)]
    pub transaction: Transaction,
}

#[derive(Error, Debug)]
pub enum WalletOpError {
    #[error("Currency is required")]
    CurrencyRequired,

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Wallet for {0} already exists")]
    AlreadyExists(String),

    #[error("Wallet not found")]
    WalletNotFound,

    #[error("Wallet is not active")]
    WalletInactive,

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("payment processor call failed: {0}")]
    Processor(#[from] ProcessorError),

    #[error("payment processor did not answer within {0:?}")]
    ProcessorTimeout(Duration),

    #[error("ledger error: {0}")]
    Store(#[from] StoreError),
}

pub struct WalletService {
    store: Arc<dyn LedgerStore>,
    processor: Arc<dyn PaymentProcessor>,
    registry: Arc<CurrencyRegistry>,
    processor_timeout: Duration,
}

impl WalletService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        processor: Arc<dyn PaymentProcessor>,
        registry: Arc<CurrencyRegistry>,
        processor_timeout: Duration,
    ) -> Self {
        Self {
            store,
            processor,
            registry,
            processor_timeout,
        }
    }

    pub async fn create_wallet(
        &self,
        owner_id: Uuid,
        currency: &str,
    ) -> Result<Outcome<Wallet>, WalletOpError> {
        let currency = currency.trim().to_uppercase();
        if currency.is_empty() {
            return Err(WalletOpError::CurrencyRequired);
        }
        if !self.registry.is_allowed(&currency) {
            return Err(WalletOpError::UnsupportedCurrency(currency));
        }

        let wallet = self
            .store
            .create_wallet(owner_id, &currency)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => WalletOpError::AlreadyExists(currency.clone()),
                other => WalletOpError::Store(other),
            })?;

        tracing::info!(wallet_id = %wallet.id, %currency, primary = wallet.is_primary, "Wallet created");
        Ok(Outcome::new(wallet.clone()).with_event(owner_id, LedgerEvent::WalletCreated(wallet)))
    }

    pub async fn list_wallets(&self, owner_id: Uuid) -> Result<Vec<Wallet>, WalletOpError> {
        Ok(self.store.list_wallets(owner_id).await?)
    }

    /// Opens a Pending FUND transaction and a payment intent for it. The
    /// balance is credited when the processor confirms the intent.
    #[tracing::instrument(skip(self, command), fields(wallet_id = %command.wallet_id))]
    pub async fn fund(
        &self,
        owner_id: Uuid,
        command: FundWallet,
    ) -> Result<Outcome<FundingReceipt>, WalletOpError> {
        if !is_positive(&command.amount) {
            return Err(WalletOpError::InvalidAmount);
        }
        let wallet = self.owned_active_wallet(owner_id, command.wallet_id).await?;
        let amount = round_money(&command.amount);

        let transaction = self
            .store
            .create_transaction(NewTransaction {
                owner_id,
                wallet_id: wallet.id,
                kind: TransactionType::Fund,
                amount: amount.clone(),
                fee: BigDecimal::from(0),
                settlement_amount: amount.clone(),
                source_currency: wallet.currency.clone(),
                destination_currency: Some(wallet.currency.clone()),
                fx_rate: BigDecimal::from(1),
                beneficiary: None,
                funding_account: command.funding_account.clone(),
            })
            .await?;

        let mut undo = Compensation::new();
        undo.transaction_created(transaction.id);

        let request = IntentRequest {
            amount,
            currency: wallet.currency.clone(),
            idempotency_key: transaction.id.to_string(),
            metadata: correlation(owner_id, &wallet, &transaction),
        };

        let opened = async {
            let intent = tokio::time::timeout(self.processor_timeout, self.processor.create_intent(request))
                .await
                .map_err(|_| WalletOpError::ProcessorTimeout(self.processor_timeout))??;
            let linked = self
                .store
                .attach_external_ref(transaction.id, &intent.id, None)
                .await?;
            Ok::<_, WalletOpError>((linked, intent.client_secret))
        }
        .await;

        match opened {
            Ok((linked, client_secret)) => {
                tracing::info!(transaction_id = %linked.id, "Wallet funding initiated");
                Ok(Outcome::new(FundingReceipt {
                    transaction: linked.clone(),
                    client_secret,
                })
                .with_event(owner_id, LedgerEvent::TransactionCreated(linked)))
            }
            Err(e) => {
                tracing::error!(error = %e, "Wallet funding failed, rolling back");
                undo.rollback(self.store.as_ref()).await;
                Err(e)
            }
        }
    }

    /// Reserves the amount and asks the processor for a payout. The
    /// transaction stays Pending until a payout webhook settles it.
    #[tracing::instrument(skip(self, command), fields(wallet_id = %command.wallet_id))]
    pub async fn withdraw(
        &self,
        owner_id: Uuid,
        command: WithdrawFromWallet,
    ) -> Result<Outcome<WithdrawalReceipt>, WalletOpError> {
        if !is_positive(&command.amount) {
            return Err(WalletOpError::InvalidAmount);
        }
        let wallet = self.owned_active_wallet(owner_id, command.wallet_id).await?;
        let amount = round_money(&command.amount);
        if wallet.balance < amount {
            return Err(WalletOpError::InsufficientBalance);
        }

        let reserved = self
            .store
            .reserve(wallet.id, &amount)
            .await
            .map_err(|e| match e {
                StoreError::InsufficientBalance { .. } => WalletOpError::InsufficientBalance,
                StoreError::WalletInactive(_) => WalletOpError::WalletInactive,
                other => WalletOpError::Store(other),
            })?;

        let mut undo = Compensation::new();
        undo.reserved(wallet.id, amount.clone());

        let opened = async {
            let transaction = self
                .store
                .create_transaction(NewTransaction {
                    owner_id,
                    wallet_id: wallet.id,
                    kind: TransactionType::Withdraw,
                    amount: amount.clone(),
                    fee: BigDecimal::from(0),
                    settlement_amount: amount.clone(),
                    source_currency: wallet.currency.clone(),
                    destination_currency: Some(wallet.currency.clone()),
                    fx_rate: BigDecimal::from(1),
                    beneficiary: command.recipient.clone(),
                    funding_account: None,
                })
                .await?;
            undo.transaction_created(transaction.id);

            let request = PayoutRequest {
                amount: amount.clone(),
                currency: wallet.currency.clone(),
                idempotency_key: transaction.id.to_string(),
                destination: command.recipient.clone(),
                metadata: correlation(owner_id, &wallet, &transaction),
            };
            let payout = tokio::time::timeout(self.processor_timeout, self.processor.create_payout(request))
                .await
                .map_err(|_| WalletOpError::ProcessorTimeout(self.processor_timeout))??;

            Ok::<_, WalletOpError>(
                self.store
                    .attach_external_ref(transaction.id, &payout.id, None)
                    .await?,
            )
        }
        .await;

        match opened {
            Ok(transaction) => {
                tracing::info!(transaction_id = %transaction.id, "Withdrawal initiated");
                let mut outcome = Outcome::new(WithdrawalReceipt {
                    wallet: reserved.clone(),
                    transaction: transaction.clone(),
                });
                outcome.emit(owner_id, LedgerEvent::WalletUpdated(reserved));
                outcome.emit(owner_id, LedgerEvent::TransactionCreated(transaction));
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(error = %e, "Withdrawal failed, rolling back");
                undo.rollback(self.store.as_ref()).await;
                Err(e)
            }
        }
    }

    /// Wallets owned by someone else are reported as missing.
    async fn owned_active_wallet(
        &self,
        owner_id: Uuid,
        wallet_id: Uuid,
    ) -> Result<Wallet, WalletOpError> {
        let wallet = self
            .store
            .get_wallet(wallet_id)
            .await?
            .filter(|w| w.owner_id == owner_id)
            .ok_or(WalletOpError::WalletNotFound)?;
        if !wallet.is_active() {
            return Err(WalletOpError::WalletInactive);
        }
        Ok(wallet)
    }
}

fn correlation(owner_id: Uuid, wallet: &Wallet, transaction: &Transaction) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("transactionId".to_string(), transaction.id.to_string());
    metadata.insert("walletId".to_string(), wallet.id.to_string());
    metadata.insert("ownerId".to_string(), owner_id.to_string());
    metadata.insert("type".to_string(), transaction.kind.to_string());
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLedgerStore;
    use crate::domain::{TransactionFilter, TransactionStatus, WalletStatus};
    use crate::processor::{ProcessorIntent, ProcessorPayout};
    use async_trait::async_trait;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    struct FakeProcessor {
        fail: bool,
    }

    #[async_trait]
    impl PaymentProcessor for FakeProcessor {
        async fn create_intent(&self, _request: IntentRequest) -> Result<ProcessorIntent, ProcessorError> {
            if self.fail {
                return Err(ProcessorError::InvalidResponse("boom".to_string()));
            }
            Ok(ProcessorIntent {
                id: "pi_fund".to_string(),
                client_secret: Some("pi_fund_secret".to_string()),
            })
        }

        async fn create_payout(&self, _request: PayoutRequest) -> Result<ProcessorPayout, ProcessorError> {
            if self.fail {
                return Err(ProcessorError::InvalidResponse("boom".to_string()));
            }
            Ok(ProcessorPayout {
                id: "po_1".to_string(),
                status: "pending".to_string(),
            })
        }
    }

    fn service(store: Arc<InMemoryLedgerStore>, fail: bool) -> WalletService {
        WalletService::new(
            store,
            Arc::new(FakeProcessor { fail }),
            Arc::new(CurrencyRegistry::default()),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn creates_primary_wallet_then_rejects_duplicate() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let svc = service(store, false);
        let owner = Uuid::new_v4();

        let created = svc.create_wallet(owner, "usd").await.unwrap();
        assert!(created.value.is_primary);
        assert_eq!(created.events[0].event.name(), "walletCreated");

        let err = svc.create_wallet(owner, "USD").await.unwrap_err();
        assert_eq!(err.to_string(), "Wallet for USD already exists");
    }

    #[tokio::test]
    async fn rejects_currencies_outside_the_reference_table() {
        let svc = service(Arc::new(InMemoryLedgerStore::new()), false);
        let err = svc.create_wallet(Uuid::new_v4(), "NGN").await.unwrap_err();
        assert!(matches!(err, WalletOpError::UnsupportedCurrency(_)));
        let err = svc.create_wallet(Uuid::new_v4(), " ").await.unwrap_err();
        assert!(matches!(err, WalletOpError::CurrencyRequired));
    }

    #[tokio::test]
    async fn fund_opens_pending_transaction_without_crediting() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let svc = service(store.clone(), false);
        let owner = Uuid::new_v4();
        let wallet = svc.create_wallet(owner, "USD").await.unwrap().value;

        let receipt = svc
            .fund(
                owner,
                FundWallet {
                    wallet_id: wallet.id,
                    amount: dec("25"),
                    funding_account: Some("card_1".to_string()),
                },
            )
            .await
            .unwrap()
            .value;

        assert_eq!(receipt.transaction.status, TransactionStatus::Pending);
        assert_eq!(receipt.transaction.kind, TransactionType::Fund);
        assert_eq!(receipt.transaction.external_ref.as_deref(), Some("pi_fund"));
        assert_eq!(receipt.client_secret.as_deref(), Some("pi_fund_secret"));
        let after = store.get_wallet(wallet.id).await.unwrap().unwrap();
        assert_eq!(after.balance, dec("0"));
    }

    #[tokio::test]
    async fn fund_failure_deletes_transaction() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let svc = service(store.clone(), true);
        let owner = Uuid::new_v4();
        let wallet = store.create_wallet(owner, "USD").await.unwrap();

        let err = svc
            .fund(
                owner,
                FundWallet {
                    wallet_id: wallet.id,
                    amount: dec("25"),
                    funding_account: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WalletOpError::Processor(_)));
        let txs = store.list_transactions(owner, &TransactionFilter::default()).await.unwrap();
        assert!(txs.is_empty());
    }

    #[tokio::test]
    async fn withdraw_reserves_and_links_payout() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let svc = service(store.clone(), false);
        let owner = Uuid::new_v4();
        let wallet = store.create_wallet(owner, "USD").await.unwrap();
        store.credit(wallet.id, &dec("100")).await.unwrap();

        let outcome = svc
            .withdraw(
                owner,
                WithdrawFromWallet {
                    wallet_id: wallet.id,
                    amount: dec("30"),
                    recipient: Some("ba_1".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.value.wallet.balance, dec("70"));
        assert_eq!(outcome.value.transaction.external_ref.as_deref(), Some("po_1"));
        let names: Vec<_> = outcome.events.iter().map(|e| e.event.name()).collect();
        assert_eq!(names, vec!["walletUpdated", "transactionCreated"]);
    }

    #[tokio::test]
    async fn withdraw_failure_restores_balance() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let svc = service(store.clone(), true);
        let owner = Uuid::new_v4();
        let wallet = store.create_wallet(owner, "USD").await.unwrap();
        store.credit(wallet.id, &dec("100")).await.unwrap();

        svc.withdraw(
            owner,
            WithdrawFromWallet {
                wallet_id: wallet.id,
                amount: dec("30"),
                recipient: None,
            },
        )
        .await
        .unwrap_err();

        let after = store.get_wallet(wallet.id).await.unwrap().unwrap();
        assert_eq!(after.balance, dec("100"));
        let txs = store.list_transactions(owner, &TransactionFilter::default()).await.unwrap();
        assert!(txs.is_empty());
    }

    #[tokio::test]
    async fn withdraw_checks_ownership_status_and_funds() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let svc = service(store.clone(), false);
        let owner = Uuid::new_v4();
        let wallet = store.create_wallet(owner, "USD").await.unwrap();
        store.credit(wallet.id, &dec("10")).await.unwrap();
        let cmd = |amount: &str| WithdrawFromWallet {
            wallet_id: wallet.id,
            amount: dec(amount),
            recipient: None,
        };

        let err = svc.withdraw(Uuid::new_v4(), cmd("1")).await.unwrap_err();
        assert!(matches!(err, WalletOpError::WalletNotFound));

        let err = svc.withdraw(owner, cmd("11")).await.unwrap_err();
        assert!(matches!(err, WalletOpError::InsufficientBalance));

        let err = svc.withdraw(owner, cmd("-1")).await.unwrap_err();
        assert!(matches!(err, WalletOpError::InvalidAmount));

        store.set_wallet_status(wallet.id, WalletStatus::Disabled).await.unwrap();
        let err = svc.withdraw(owner, cmd("1")).await.unwrap_err();
        assert!(matches!(err, WalletOpError::WalletInactive));
    }
}
