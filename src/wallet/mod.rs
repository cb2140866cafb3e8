//! Wallet state and orchestration
//!
//! - wallet state, pending reconciliation and the ledger view
//! - the wallet manager: update cycle, fee estimation, send pipeline

pub mod manager;
pub mod state;

pub use manager::{LoadPhase, WalletManager, WalletSummary};
pub use state::{
    AssetBalance, LedgerView, PendingTransaction, TxStatus, UnspentOutput, Wallet, WalletView,
};
