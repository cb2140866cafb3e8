//! Multi-chain wallet backend
//!
//! For a fixed set of heterogeneous ledgers this crate derives addresses,
//! tracks balances and pending activity, builds unsigned transaction
//! preimages, accepts externally produced signatures, assembles wire-format
//! transactions and submits them through a failover-aware set of RPC
//! providers.
//!
//! # Architecture
//!
//! - **`amount`**: typed value model (coin / token / reserve)
//! - **`chains`**: one `ChainAdapter` per ledger family, selected through a
//!   registry keyed by the `Ledger` tag
//! - **`network`**: ordered multi-provider failover
//! - **`signer`**: external-signing capability and signature marshalling
//! - **`wallet`**: wallet state, reconciliation and the manager
//! - **`api`**: thin axum surface over the managers

pub mod amount;
pub mod api;
pub mod chains;
pub mod config;
pub mod error;
pub mod fee;
pub mod keys;
pub mod network;
pub mod signer;
pub mod wallet;

pub use amount::{Amount, AmountKind, Token};
pub use chains::{ChainAdapter, Ledger, TransferIntent};
pub use error::{BuildError, SendViolation, SignerError, WalletError};
pub use fee::{Fee, FeeSchedule, FeeTier};
pub use keys::PublicKey;
pub use network::{MultiProvider, ProviderError};
pub use signer::{ChainSignature, Curve, LocalKeySigner, SignerBridge, TransactionSigner};
pub use wallet::{Wallet, WalletManager};
