//! Wallet state
//!
//! The wallet owns the address set, per-kind balances, the ledger view
//! (unspent outputs or account nonce) and the pending-transaction list.
//! Everything is replaced wholesale by the update cycle; the transaction
//! builders only ever read it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::amount::{Amount, AmountKind, Token};
use crate::chains::Ledger;
use crate::error::WalletError;
use crate::keys::PublicKey;

/// A spendable output on a UTXO ledger, optionally carrying non-native
/// asset balances alongside the native amount. Immutable once constructed;
/// the active set is replaced atomically on refresh, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub tx_hash: String,
    pub output_index: u32,
    pub address: String,
    pub amount: u64,
    pub assets: Vec<AssetBalance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset_id: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Unconfirmed,
    Confirmed,
}

/// Local bookkeeping record for a broadcast transaction, kept until the
/// provider reports its hash as confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub hash: String,
    pub amount: Amount,
    pub fee: Amount,
    pub source: String,
    pub destination: String,
    pub date: DateTime<Utc>,
    pub status: TxStatus,
}

/// Per-family ledger view retained for transaction building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerView {
    Utxo { outputs: Vec<UnspentOutput> },
    Account { nonce: u64 },
}

/// One refresh cycle's result, applied to the wallet as a single atomic
/// replacement.
#[derive(Debug, Clone)]
pub struct WalletView {
    pub balances: Vec<Amount>,
    pub view: LedgerView,
    pub confirmed_hashes: Vec<String>,
}

/// Balance map key: kinds collapse to the ledger's identity rules (token
/// contracts compare case-insensitively).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BalanceKey {
    Coin,
    Token(String),
    Reserve,
}

impl From<&AmountKind> for BalanceKey {
    fn from(kind: &AmountKind) -> Self {
        match kind {
            AmountKind::Coin => BalanceKey::Coin,
            AmountKind::Token(t) => BalanceKey::Token(t.contract_address.to_ascii_lowercase()),
            AmountKind::Reserve => BalanceKey::Reserve,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Wallet {
    pub ledger: Ledger,
    pub public_key: PublicKey,
    addresses: Vec<String>,
    balances: HashMap<BalanceKey, Amount>,
    pending: Vec<PendingTransaction>,
    view: LedgerView,
}

impl Wallet {
    /// A wallet exists per (ledger, public key) pair and must have at least
    /// one address.
    pub fn new(
        ledger: Ledger,
        public_key: PublicKey,
        addresses: Vec<String>,
    ) -> Result<Self, WalletError> {
        if addresses.is_empty() {
            return Err(WalletError::InvalidInput(
                "wallet requires at least one address".to_string(),
            ));
        }
        let view = match ledger.family() {
            LedgerFamily::Utxo => LedgerView::Utxo {
                outputs: Vec::new(),
            },
            LedgerFamily::Account => LedgerView::Account { nonce: 0 },
        };
        Ok(Self {
            ledger,
            public_key,
            addresses,
            balances: HashMap::new(),
            pending: Vec::new(),
            view,
        })
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn default_address(&self) -> &str {
        &self.addresses[0]
    }

    pub fn balances(&self) -> impl Iterator<Item = &Amount> {
        self.balances.values()
    }

    pub fn balance(&self, kind: &AmountKind) -> Option<&Amount> {
        self.balances.get(&BalanceKey::from(kind))
    }

    pub fn coin_balance(&self) -> Option<&Amount> {
        self.balances.get(&BalanceKey::Coin)
    }

    pub fn token_balance(&self, token: &Token) -> Option<&Amount> {
        self.balances
            .get(&BalanceKey::Token(token.contract_address.to_ascii_lowercase()))
    }

    /// A wallet is empty when no non-reserve balance is non-zero.
    pub fn is_empty(&self) -> bool {
        !self.balances.iter().any(|(key, amount)| {
            !matches!(key, BalanceKey::Reserve) && amount.value.unwrap_or(0) > 0
        })
    }

    pub fn view(&self) -> &LedgerView {
        &self.view
    }

    pub fn unspent_outputs(&self) -> &[UnspentOutput] {
        match &self.view {
            LedgerView::Utxo { outputs } => outputs,
            LedgerView::Account { .. } => &[],
        }
    }

    pub fn nonce(&self) -> Option<u64> {
        match &self.view {
            LedgerView::Account { nonce } => Some(*nonce),
            LedgerView::Utxo { .. } => None,
        }
    }

    /// Total native value across the unspent-output set.
    pub fn total_unspent_coin(&self) -> u64 {
        self.unspent_outputs().iter().map(|u| u.amount).sum()
    }

    /// All non-native assets held across the unspent-output set, aggregated
    /// by asset id.
    pub fn held_assets(&self) -> Vec<AssetBalance> {
        let mut totals: Vec<AssetBalance> = Vec::new();
        for output in self.unspent_outputs() {
            for asset in &output.assets {
                match totals.iter_mut().find(|t| t.asset_id == asset.asset_id) {
                    Some(existing) => existing.amount += asset.amount,
                    None => totals.push(asset.clone()),
                }
            }
        }
        totals
    }

    pub fn pending_outgoing_transactions(&self) -> &[PendingTransaction] {
        &self.pending
    }

    pub fn pending_hashes(&self) -> Vec<String> {
        self.pending.iter().map(|p| p.hash.clone()).collect()
    }

    pub fn add_pending(&mut self, tx: PendingTransaction) {
        self.pending.push(tx);
    }

    /// Commit one refresh cycle: balances and the ledger view are replaced
    /// (never merged), then pending transactions are reconciled against the
    /// provider's confirmed-hash list.
    pub fn apply_view(&mut self, view: WalletView) {
        self.balances = view
            .balances
            .into_iter()
            .map(|amount| (BalanceKey::from(&amount.kind), amount))
            .collect();

        let empty_utxo_set = matches!(&view.view, LedgerView::Utxo { outputs } if outputs.is_empty());
        self.view = view.view;

        if empty_utxo_set && view.confirmed_hashes.is_empty() {
            // No outputs and no history: the chain state was likely wiped or
            // reorged, so stale pendings would never reconcile.
            if !self.pending.is_empty() {
                log::info!(
                    "{}: provider reports empty state, clearing {} pending transaction(s)",
                    self.ledger,
                    self.pending.len()
                );
                self.pending.clear();
            }
            return;
        }

        let confirmed: Vec<String> = view
            .confirmed_hashes
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        self.pending
            .retain(|tx| !confirmed.contains(&tx.hash.to_ascii_lowercase()));
    }
}

/// Ledger families this backend can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerFamily {
    Utxo,
    Account,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_wallet() -> Wallet {
        Wallet::new(
            Ledger::Cardano,
            PublicKey::new(vec![1u8; 32]),
            vec!["addr_test".to_string()],
        )
        .expect("wallet")
    }

    fn pending(hash: &str) -> PendingTransaction {
        PendingTransaction {
            hash: hash.to_string(),
            amount: Amount::coin(1_000_000, 6),
            fee: Amount::coin(170_000, 6),
            source: "addr_test".to_string(),
            destination: "addr_dest".to_string(),
            date: Utc::now(),
            status: TxStatus::Unconfirmed,
        }
    }

    fn utxo(amount: u64) -> UnspentOutput {
        UnspentOutput {
            tx_hash: "aa".repeat(32),
            output_index: 0,
            address: "addr_test".to_string(),
            amount,
            assets: Vec::new(),
        }
    }

    #[test]
    fn rejects_empty_address_set() {
        let result = Wallet::new(Ledger::Cardano, PublicKey::new(vec![1u8; 32]), Vec::new());
        assert!(result.is_err());
    }

    #[test]
    fn empty_ignores_reserve_balances() {
        let mut wallet = test_wallet();
        wallet.apply_view(WalletView {
            balances: vec![Amount::coin(0, 6), Amount::reserve(1_000_000, 6)],
            view: LedgerView::Utxo {
                outputs: vec![utxo(1)],
            },
            confirmed_hashes: vec!["aa".to_string()],
        });
        assert!(wallet.is_empty());
    }

    #[test]
    fn confirmed_hash_removes_pending_case_insensitively() {
        let mut wallet = test_wallet();
        wallet.add_pending(pending("ABCDEF"));
        wallet.apply_view(WalletView {
            balances: vec![Amount::coin(5_000_000, 6)],
            view: LedgerView::Utxo {
                outputs: vec![utxo(5_000_000)],
            },
            confirmed_hashes: vec!["abcdef".to_string()],
        });
        assert!(wallet.pending_outgoing_transactions().is_empty());
    }

    #[test]
    fn unrelated_hashes_keep_pending() {
        let mut wallet = test_wallet();
        wallet.add_pending(pending("abc123"));
        wallet.apply_view(WalletView {
            balances: vec![Amount::coin(5_000_000, 6)],
            view: LedgerView::Utxo {
                outputs: vec![utxo(5_000_000)],
            },
            confirmed_hashes: vec!["ffff".to_string()],
        });
        assert_eq!(wallet.pending_outgoing_transactions().len(), 1);
    }

    #[test]
    fn empty_state_clears_all_pending() {
        let mut wallet = test_wallet();
        wallet.add_pending(pending("abc123"));
        wallet.add_pending(pending("def456"));
        wallet.apply_view(WalletView {
            balances: vec![Amount::coin(0, 6)],
            view: LedgerView::Utxo {
                outputs: Vec::new(),
            },
            confirmed_hashes: Vec::new(),
        });
        assert!(wallet.pending_outgoing_transactions().is_empty());
    }

    #[test]
    fn held_assets_aggregates_across_outputs() {
        let mut wallet = test_wallet();
        let mut a = utxo(2_000_000);
        a.assets.push(AssetBalance {
            asset_id: "aa".to_string(),
            amount: 5,
        });
        let mut b = utxo(3_000_000);
        b.assets.push(AssetBalance {
            asset_id: "aa".to_string(),
            amount: 7,
        });
        b.assets.push(AssetBalance {
            asset_id: "bb".to_string(),
            amount: 1,
        });
        wallet.apply_view(WalletView {
            balances: vec![Amount::coin(5_000_000, 6)],
            view: LedgerView::Utxo {
                outputs: vec![a, b],
            },
            confirmed_hashes: vec!["aa".to_string()],
        });

        let held = wallet.held_assets();
        assert_eq!(held.len(), 2);
        assert_eq!(held.iter().find(|a| a.asset_id == "aa").unwrap().amount, 12);
        assert_eq!(wallet.total_unspent_coin(), 5_000_000);
    }
}
