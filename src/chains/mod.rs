//! Per-ledger chain support
//!
//! Each ledger family implements the `ChainAdapter` trait once (address
//! derivation, state fetch, fee estimation, transaction building,
//! broadcast); the registry selects the implementation from the `Ledger`
//! tag through an exhaustive match, so adding a ledger without wiring it is
//! a compile error, not a runtime surprise.

pub mod cardano;
pub mod ethereum;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::amount::Amount;
use crate::config::ChainSettings;
use crate::error::{BuildError, SendViolation, WalletError};
use crate::fee::{Fee, FeeSchedule};
use crate::keys::PublicKey;
use crate::signer::{ChainSignature, Curve};
use crate::wallet::state::{LedgerFamily, Wallet, WalletView};

pub use cardano::CardanoAdapter;
pub use ethereum::EthereumAdapter;

/// Supported ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ledger {
    Cardano,
    Ethereum,
}

impl Ledger {
    pub fn family(&self) -> LedgerFamily {
        match self {
            Ledger::Cardano => LedgerFamily::Utxo,
            Ledger::Ethereum => LedgerFamily::Account,
        }
    }

    pub fn curve(&self) -> Curve {
        match self {
            Ledger::Cardano => Curve::Ed25519Cardano,
            Ledger::Ethereum => Curve::Secp256k1,
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Ledger::Cardano => 6,
            Ledger::Ethereum => 18,
        }
    }

    pub fn coin_symbol(&self) -> &'static str {
        match self {
            Ledger::Cardano => "ADA",
            Ledger::Ethereum => "ETH",
        }
    }
}

impl fmt::Display for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ledger::Cardano => write!(f, "cardano"),
            Ledger::Ethereum => write!(f, "ethereum"),
        }
    }
}

impl FromStr for Ledger {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cardano" => Ok(Ledger::Cardano),
            "ethereum" => Ok(Ledger::Ethereum),
            other => Err(WalletError::InvalidInput(format!(
                "unknown ledger: {}",
                other
            ))),
        }
    }
}

/// A logical transfer the caller wants to make. Immutable once created.
#[derive(Debug, Clone)]
pub struct TransferIntent {
    pub amount: Amount,
    pub fee: Fee,
    pub source: String,
    pub destination: String,
    /// Defaults to `source` when absent.
    pub change_address: Option<String>,
    pub contract_address: Option<String>,
    pub params: Option<String>,
}

impl TransferIntent {
    pub fn change_address(&self) -> &str {
        self.change_address.as_deref().unwrap_or(&self.source)
    }
}

/// Output of `build_for_sign`: the canonical digest plus the exact
/// intermediate state `build_for_send` needs to assemble wire bytes
/// deterministically.
#[derive(Debug, Clone)]
pub struct SigningPayload {
    pub digest: Vec<u8>,
    pub context: PayloadContext,
}

#[derive(Debug, Clone)]
pub enum PayloadContext {
    Cardano(cardano::builder::CardanoPayload),
    Ethereum(ethereum::builder::EthereumPayload),
}

/// One ledger family's full capability surface.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn ledger(&self) -> Ledger;

    /// Addresses for the given public key, in presentation order.
    fn derive_addresses(&self, key: &PublicKey) -> Result<Vec<String>, WalletError>;

    /// Fetch balances, the ledger view and reconciliation data for one
    /// update cycle. Read-only queries inside may fan out concurrently;
    /// `pending_hashes` lets account ledgers check broadcast outcomes.
    async fn fetch_view(
        &self,
        addresses: &[String],
        pending_hashes: &[String],
    ) -> Result<WalletView, WalletError>;

    /// Quote the fee for an intended transfer.
    async fn fee_schedule(
        &self,
        wallet: &Wallet,
        intent: &TransferIntent,
    ) -> Result<FeeSchedule, WalletError>;

    /// Pre-flight validation. Returns every violation that applies, not
    /// just the first.
    fn validate(&self, wallet: &Wallet, intent: &TransferIntent) -> Vec<SendViolation>;

    /// Build the canonical hash-for-sign. Pure read of the wallet state.
    fn build_for_sign(
        &self,
        wallet: &Wallet,
        intent: &TransferIntent,
    ) -> Result<SigningPayload, BuildError>;

    /// Combine the retained intermediate state with a signature into
    /// broadcastable wire bytes, verifying the signature locally first.
    fn build_for_send(
        &self,
        payload: &SigningPayload,
        signature: &ChainSignature,
    ) -> Result<Vec<u8>, BuildError>;

    /// Submit wire bytes through the failover layer; returns the tx hash.
    async fn broadcast(&self, raw: &[u8]) -> Result<String, WalletError>;
}

/// Construct the adapter for a configured ledger. The match is exhaustive
/// on purpose: a new `Ledger` variant will not compile until it is wired
/// here.
pub fn build_adapter(settings: &ChainSettings) -> Result<Arc<dyn ChainAdapter>, WalletError> {
    match settings.ledger {
        Ledger::Cardano => Ok(Arc::new(CardanoAdapter::from_settings(settings)?)),
        Ledger::Ethereum => Ok(Arc::new(EthereumAdapter::from_settings(settings)?)),
    }
}

/// Validation checks shared by every ledger family.
pub(crate) fn validate_common(wallet: &Wallet, intent: &TransferIntent) -> Vec<SendViolation> {
    let mut violations = Vec::new();

    if matches!(intent.amount.kind, crate::amount::AmountKind::Reserve) {
        violations.push(SendViolation::ReserveNotSpendable);
    }

    if !intent.amount.is_loaded() || intent.amount.is_zero() {
        violations.push(SendViolation::AmountBelowMinimum);
    }

    if !intent.fee.amount.is_loaded() {
        violations.push(SendViolation::FeeNotLoaded);
    }

    let amount = intent.amount.value.unwrap_or(0);
    let fee = intent.fee.amount.value.unwrap_or(0);
    let coin_balance = wallet
        .coin_balance()
        .and_then(|b| b.value)
        .unwrap_or(0);

    match &intent.amount.kind {
        crate::amount::AmountKind::Coin => {
            if amount > coin_balance {
                violations.push(SendViolation::AmountExceedsBalance);
            }
            if fee > coin_balance {
                violations.push(SendViolation::FeeExceedsBalance);
            }
            if amount.saturating_add(fee) > coin_balance {
                violations.push(SendViolation::TotalExceedsBalance);
            }
        }
        crate::amount::AmountKind::Token(token) => {
            let token_balance = wallet
                .token_balance(token)
                .and_then(|b| b.value)
                .unwrap_or(0);
            if amount > token_balance {
                violations.push(SendViolation::AmountExceedsBalance);
            }
            if fee > coin_balance {
                violations.push(SendViolation::FeeExceedsBalance);
            }
        }
        crate::amount::AmountKind::Reserve => {}
    }

    violations
}
