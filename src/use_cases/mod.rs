//! Application operations. Each returns an [`Outcome`](crate::domain::Outcome)
//! whose events the caller dispatches after the work is committed.

pub mod compensation;
pub mod make_payment;
pub mod reconcile_webhook;
pub mod wallet_ops;

pub use make_payment::{MakePayment, PaymentError, PaymentOrchestrator, PaymentReceipt};
pub use reconcile_webhook::{IgnoreReason, Reconciliation, WebhookReconciler};
pub use wallet_ops::{
    FundWallet, FundingReceipt, WalletOpError, WalletService, WithdrawFromWallet,
    WithdrawalReceipt,
};
