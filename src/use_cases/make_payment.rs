//! Make payment use case.
//!
//! Reserves `amount + fee` from the payer's wallet, opens a Pending PAYMENT
//! transaction and a processor payment intent, then links the intent back to
//! the transaction. Any failure after the reservation undoes every applied
//! step before the error is returned. Settlement happens later through the
//! webhook reconciler.

use bigdecimal::BigDecimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::compensation::Compensation;
use crate::domain::money::{is_negative, is_positive, round_money};
use crate::domain::{LedgerEvent, NewPayment, NewTransaction, Outcome, TransactionType};
use crate::ports::{LedgerStore, StoreError};
use crate::processor::{IntentRequest, PaymentProcessor, ProcessorError};
use crate::services::fx::{FxError, FxRateResolver};

/// Validated payment command.
#[derive(Debug, Clone)]
pub struct MakePayment {
    pub beneficiary: String,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    /// Currency of the payer's wallet.
    pub source_currency: String,
    pub destination_currency: String,
    /// Quoted rate. When absent the current resolver rate is used.
    pub fx_rate: Option<BigDecimal>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub transaction_id: Uuid,
    pub client_secret: Option<String>,
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("{0}")]
    Validation(String),

    #[error("Wallet ({0}) not found")]
    WalletNotFound(String),

    #[error("Wallet is not active")]
    WalletInactive,

    #[error("Insufficient wallet balance")]
    InsufficientBalance,

    #[error("payment processor call failed: {0}")]
    Processor(#[from] ProcessorError),

    #[error("payment processor did not answer within {0:?}")]
    ProcessorTimeout(Duration),

    #[error("ledger error: {0}")]
    Store(#[from] StoreError),
}

pub struct PaymentOrchestrator {
    store: Arc<dyn LedgerStore>,
    processor: Arc<dyn PaymentProcessor>,
    fx: Arc<FxRateResolver>,
    processor_timeout: Duration,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        processor: Arc<dyn PaymentProcessor>,
        fx: Arc<FxRateResolver>,
        processor_timeout: Duration,
    ) -> Self {
        Self {
            store,
            processor,
            fx,
            processor_timeout,
        }
    }

    #[tracing::instrument(
        skip(self, command),
        fields(source = %command.source_currency, destination = %command.destination_currency)
    )]
    pub async fn make_payment(
        &self,
        owner_id: Uuid,
        command: MakePayment,
    ) -> Result<Outcome<PaymentReceipt>, PaymentError> {
        let source = command.source_currency.trim().to_uppercase();
        let destination = command.destination_currency.trim().to_uppercase();
        self.validate(&command, &destination)?;
        let fx_rate = self.rate_for(&command, &source, &destination).await?;

        let wallet = self
            .store
            .find_wallet(owner_id, &source)
            .await?
            .ok_or_else(|| PaymentError::WalletNotFound(source.clone()))?;
        if !wallet.is_active() {
            return Err(PaymentError::WalletInactive);
        }

        let total_debit = &command.amount + &command.fee;
        if wallet.balance < total_debit {
            return Err(PaymentError::InsufficientBalance);
        }

        // The conditional reserve is the real guard; the check above only
        // avoids a write on the common rejection path.
        let reserved = self
            .store
            .reserve(wallet.id, &total_debit)
            .await
            .map_err(|e| match e {
                StoreError::InsufficientBalance { .. } => PaymentError::InsufficientBalance,
                StoreError::WalletInactive(_) => PaymentError::WalletInactive,
                other => PaymentError::Store(other),
            })?;

        let mut undo = Compensation::new();
        undo.reserved(wallet.id, total_debit.clone());

        let mut outcome = Outcome::new(());
        let result = self
            .open_payment(
                owner_id,
                &command,
                &source,
                &destination,
                fx_rate,
                wallet.id,
                &mut undo,
                &mut outcome,
            )
            .await;

        match result {
            Ok(receipt) => {
                outcome.emit(owner_id, LedgerEvent::WalletUpdated(reserved));
                tracing::info!(transaction_id = %receipt.transaction_id, "Payment initiated");
                Ok(Outcome {
                    value: receipt,
                    events: outcome.events,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "Payment initiation failed, rolling back");
                undo.rollback(self.store.as_ref()).await;
                Err(e)
            }
        }
    }

    fn validate(&self, command: &MakePayment, destination: &str) -> Result<(), PaymentError> {
        if command.beneficiary.trim().is_empty() {
            return Err(PaymentError::Validation("Beneficiary is required".to_string()));
        }
        if command.source_currency.trim().is_empty() || destination.is_empty() {
            return Err(PaymentError::Validation(
                "Source and destination currencies are required".to_string(),
            ));
        }
        if !is_positive(&command.amount) {
            return Err(PaymentError::Validation("Invalid amount".to_string()));
        }
        if is_negative(&command.fee) {
            return Err(PaymentError::Validation("Invalid fee".to_string()));
        }
        if !self.fx.registry().is_allowed(destination) {
            return Err(PaymentError::Validation(format!(
                "Unsupported currency: {}",
                destination
            )));
        }
        Ok(())
    }

    async fn rate_for(
        &self,
        command: &MakePayment,
        source: &str,
        destination: &str,
    ) -> Result<BigDecimal, PaymentError> {
        match &command.fx_rate {
            Some(rate) if is_positive(rate) => Ok(rate.clone()),
            Some(_) => Err(PaymentError::Validation("Invalid fxRate".to_string())),
            None => self
                .fx
                .get_rate(source, destination)
                .await
                .map(|resolved| resolved.rate)
                .map_err(|e| match e {
                    FxError::UnsupportedCurrency(code) => {
                        PaymentError::Validation(format!("Unsupported currency: {}", code))
                    }
                    other => PaymentError::Validation(other.to_string()),
                }),
        }
    }

    /// Steps after the reservation: transaction, intent, payment record and
    /// correlation. Every applied step is registered with `undo`.
    #[allow(clippy::too_many_arguments)]
    async fn open_payment(
        &self,
        owner_id: Uuid,
        command: &MakePayment,
        source: &str,
        destination: &str,
        fx_rate: BigDecimal,
        wallet_id: Uuid,
        undo: &mut Compensation,
        outcome: &mut Outcome<()>,
    ) -> Result<PaymentReceipt, PaymentError> {
        let settlement_amount = round_money(&(&command.amount * &fx_rate));

        let transaction = self
            .store
            .create_transaction(NewTransaction {
                owner_id,
                wallet_id,
                kind: TransactionType::Payment,
                amount: command.amount.clone(),
                fee: command.fee.clone(),
                settlement_amount: settlement_amount.clone(),
                source_currency: source.to_string(),
                destination_currency: Some(destination.to_string()),
                fx_rate: fx_rate.clone(),
                beneficiary: Some(command.beneficiary.trim().to_string()),
                funding_account: None,
            })
            .await?;
        undo.transaction_created(transaction.id);
        outcome.emit(owner_id, LedgerEvent::TransactionCreated(transaction.clone()));

        let mut metadata = BTreeMap::new();
        metadata.insert("transactionId".to_string(), transaction.id.to_string());
        metadata.insert("walletId".to_string(), wallet_id.to_string());
        metadata.insert("ownerId".to_string(), owner_id.to_string());
        metadata.insert("type".to_string(), TransactionType::Payment.to_string());

        let request = IntentRequest {
            amount: command.amount.clone(),
            currency: destination.to_string(),
            idempotency_key: transaction.id.to_string(),
            metadata,
        };
        let intent = tokio::time::timeout(self.processor_timeout, self.processor.create_intent(request))
            .await
            .map_err(|_| PaymentError::ProcessorTimeout(self.processor_timeout))??;

        let payment = self
            .store
            .create_payment(NewPayment {
                owner_id,
                transaction_id: transaction.id,
                beneficiary: command.beneficiary.trim().to_string(),
                amount: command.amount.clone(),
                source_wallet_id: wallet_id,
                source_currency: source.to_string(),
                destination_currency: destination.to_string(),
                fx_rate,
                fee: command.fee.clone(),
                settlement_amount,
                external_ref: intent.id.clone(),
            })
            .await?;

        let linked = self
            .store
            .attach_external_ref(transaction.id, &intent.id, Some(payment.id))
            .await?;

        // A fast webhook can settle the transaction before the payment row
        // exists; bring the shadow record in line.
        if linked.status.is_terminal() {
            self.store
                .set_payment_status(payment.id, linked.status.into())
                .await?;
        }

        Ok(PaymentReceipt {
            transaction_id: transaction.id,
            client_secret: intent.client_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLedgerStore;
    use crate::config::currencies::CurrencyRegistry;
    use crate::domain::{TransactionFilter, TransactionStatus};
    use crate::processor::{PayoutRequest, ProcessorIntent, ProcessorPayout};
    use async_trait::async_trait;
    use std::str::FromStr;
    use std::sync::Mutex;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    enum Behaviour {
        Succeed,
        Fail,
        Hang,
    }

    struct FakeProcessor {
        behaviour: Behaviour,
        requests: Mutex<Vec<IntentRequest>>,
    }

    impl FakeProcessor {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PaymentProcessor for FakeProcessor {
        async fn create_intent(&self, request: IntentRequest) -> Result<ProcessorIntent, ProcessorError> {
            self.requests.lock().unwrap().push(request);
            match self.behaviour {
                Behaviour::Succeed => Ok(ProcessorIntent {
                    id: "pi_123".to_string(),
                    client_secret: Some("pi_123_secret".to_string()),
                }),
                Behaviour::Fail => Err(ProcessorError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                }),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("timeout should fire first")
                }
            }
        }

        async fn create_payout(&self, _request: PayoutRequest) -> Result<ProcessorPayout, ProcessorError> {
            unimplemented!("payments never create payouts")
        }
    }

    struct Fixture {
        store: Arc<InMemoryLedgerStore>,
        orchestrator: PaymentOrchestrator,
        owner: Uuid,
        wallet_id: Uuid,
    }

    async fn fixture(balance: &str, processor: Arc<FakeProcessor>) -> Fixture {
        let store = Arc::new(InMemoryLedgerStore::new());
        let owner = Uuid::new_v4();
        let wallet = store.create_wallet(owner, "USD").await.unwrap();
        store.credit(wallet.id, &dec(balance)).await.unwrap();

        let fx = Arc::new(FxRateResolver::offline(Arc::new(CurrencyRegistry::default())));
        let orchestrator = PaymentOrchestrator::new(
            store.clone(),
            processor,
            fx,
            Duration::from_millis(200),
        );
        Fixture {
            store,
            orchestrator,
            owner,
            wallet_id: wallet.id,
        }
    }

    fn command() -> MakePayment {
        MakePayment {
            beneficiary: "Jane Doe".to_string(),
            amount: dec("100"),
            fee: dec("5"),
            source_currency: "USD".to_string(),
            destination_currency: "EUR".to_string(),
            fx_rate: Some(dec("1.2")),
        }
    }

    async fn balance(f: &Fixture) -> BigDecimal {
        f.store.get_wallet(f.wallet_id).await.unwrap().unwrap().balance
    }

    async fn transaction_count(f: &Fixture) -> usize {
        f.store
            .list_transactions(f.owner, &TransactionFilter::default())
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn happy_path_reserves_and_opens_pending_transaction() {
        let processor = FakeProcessor::new(Behaviour::Succeed);
        let f = fixture("500", processor.clone()).await;

        let outcome = f.orchestrator.make_payment(f.owner, command()).await.unwrap();
        let receipt = outcome.value;

        assert_eq!(receipt.client_secret.as_deref(), Some("pi_123_secret"));
        assert_eq!(balance(&f).await, dec("395"));

        let tx = f.store.get_transaction(receipt.transaction_id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.settlement_amount.to_string(), "120.00");
        assert_eq!(tx.external_ref.as_deref(), Some("pi_123"));

        let payment = f.store.find_payment_by_external_ref("pi_123").await.unwrap().unwrap();
        assert_eq!(tx.payment_id, Some(payment.id));

        let names: Vec<_> = outcome.events.iter().map(|e| e.event.name()).collect();
        assert_eq!(names, vec!["transactionCreated", "walletUpdated"]);

        let requests = processor.requests.lock().unwrap();
        assert_eq!(requests[0].currency, "EUR");
        assert_eq!(requests[0].idempotency_key, receipt.transaction_id.to_string());
        assert_eq!(
            requests[0].metadata.get("transactionId"),
            Some(&receipt.transaction_id.to_string())
        );
    }

    #[tokio::test]
    async fn insufficient_balance_changes_nothing() {
        let processor = FakeProcessor::new(Behaviour::Succeed);
        let f = fixture("50", processor.clone()).await;

        let err = f.orchestrator.make_payment(f.owner, command()).await.unwrap_err();
        assert!(matches!(err, PaymentError::InsufficientBalance));
        assert_eq!(err.to_string(), "Insufficient wallet balance");
        assert_eq!(balance(&f).await, dec("50"));
        assert_eq!(transaction_count(&f).await, 0);
        assert!(processor.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn processor_outage_rolls_everything_back() {
        let f = fixture("500", FakeProcessor::new(Behaviour::Fail)).await;

        let err = f.orchestrator.make_payment(f.owner, command()).await.unwrap_err();
        assert!(matches!(err, PaymentError::Processor(_)));
        assert_eq!(balance(&f).await, dec("500"));
        assert_eq!(transaction_count(&f).await, 0);
        assert!(f.store.find_payment_by_external_ref("pi_123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn processor_timeout_rolls_back() {
        let f = fixture("500", FakeProcessor::new(Behaviour::Hang)).await;

        let err = f.orchestrator.make_payment(f.owner, command()).await.unwrap_err();
        assert!(matches!(err, PaymentError::ProcessorTimeout(_)));
        assert_eq!(balance(&f).await, dec("500"));
        assert_eq!(transaction_count(&f).await, 0);
    }

    #[tokio::test]
    async fn missing_wallet_names_the_currency() {
        let f = fixture("500", FakeProcessor::new(Behaviour::Succeed)).await;
        let mut cmd = command();
        cmd.source_currency = "gbp".to_string();

        let err = f.orchestrator.make_payment(f.owner, cmd).await.unwrap_err();
        assert_eq!(err.to_string(), "Wallet (GBP) not found");
    }

    #[tokio::test]
    async fn validation_messages() {
        let f = fixture("500", FakeProcessor::new(Behaviour::Succeed)).await;
        let cases: Vec<(Box<dyn Fn(&mut MakePayment)>, &str)> = vec![
            (Box::new(|c: &mut MakePayment| c.beneficiary = " ".to_string()), "Beneficiary is required"),
            (
                Box::new(|c: &mut MakePayment| c.destination_currency = String::new()),
                "Source and destination currencies are required",
            ),
            (Box::new(|c: &mut MakePayment| c.amount = dec("0")), "Invalid amount"),
            (Box::new(|c: &mut MakePayment| c.fee = dec("-1")), "Invalid fee"),
            (Box::new(|c: &mut MakePayment| c.fx_rate = Some(dec("0"))), "Invalid fxRate"),
        ];

        for (mutate, message) in cases {
            let mut cmd = command();
            mutate(&mut cmd);
            let err = f.orchestrator.make_payment(f.owner, cmd).await.unwrap_err();
            assert!(matches!(err, PaymentError::Validation(_)));
            assert_eq!(err.to_string(), message);
        }
        assert_eq!(balance(&f).await, dec("500"));
    }

    #[tokio::test]
    async fn resolves_rate_when_not_quoted() {
        let f = fixture("500", FakeProcessor::new(Behaviour::Succeed)).await;
        let mut cmd = command();
        cmd.fx_rate = None;

        let receipt = f.orchestrator.make_payment(f.owner, cmd).await.unwrap().value;
        let tx = f.store.get_transaction(receipt.transaction_id).await.unwrap().unwrap();
        assert_eq!(tx.fx_rate, dec("0.92"));
        assert_eq!(tx.settlement_amount.to_string(), "92.00");
    }

    #[tokio::test]
    async fn inactive_wallet_is_rejected() {
        let f = fixture("500", FakeProcessor::new(Behaviour::Succeed)).await;
        f.store
            .set_wallet_status(f.wallet_id, crate::domain::WalletStatus::Disabled)
            .await
            .unwrap();

        let err = f.orchestrator.make_payment(f.owner, command()).await.unwrap_err();
        assert!(matches!(err, PaymentError::WalletInactive));
        assert_eq!(balance(&f).await, dec("500"));
    }
}
