//! Wallet manager
//!
//! One manager per (blockchain, public key) pair. It runs the update cycle
//! against the provider layer, exposes fee estimation and the
//! build -> sign -> assemble -> broadcast pipeline, and owns the wallet
//! state: the update cycle is the only writer after construction.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::amount::Amount;
use crate::chains::{ChainAdapter, Ledger, TransferIntent};
use crate::error::WalletError;
use crate::fee::FeeSchedule;
use crate::keys::PublicKey;
use crate::signer::SignerBridge;
use crate::wallet::state::{PendingTransaction, TxStatus, Wallet};

/// Successful refreshes within this window return the cached state instead
/// of hitting the network again.
const REFRESH_COOLDOWN: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    Initial,
    Loading,
    Loaded,
    Failed,
}

struct UpdateGate {
    phase: LoadPhase,
    last_refresh: Option<Instant>,
    last_failure: Option<String>,
}

pub struct WalletManager {
    adapter: Arc<dyn ChainAdapter>,
    signer: SignerBridge,
    state: RwLock<Wallet>,
    gate: Mutex<UpdateGate>,
    generation: AtomicU64,
}

impl WalletManager {
    /// Build the manager and derive the wallet's addresses from the public
    /// key up front.
    pub fn new(
        adapter: Arc<dyn ChainAdapter>,
        signer: SignerBridge,
        public_key: PublicKey,
    ) -> Result<Self, WalletError> {
        let addresses = adapter.derive_addresses(&public_key)?;
        let wallet = Wallet::new(adapter.ledger(), public_key, addresses)?;

        Ok(Self {
            adapter,
            signer,
            state: RwLock::new(wallet),
            gate: Mutex::new(UpdateGate {
                phase: LoadPhase::Initial,
                last_refresh: None,
                last_failure: None,
            }),
            generation: AtomicU64::new(0),
        })
    }

    pub fn ledger(&self) -> Ledger {
        self.adapter.ledger()
    }

    /// Refresh balances, the ledger view and pending reconciliation.
    ///
    /// Single flight: a second call arriving while a refresh is in flight
    /// waits for that refresh and returns its result without issuing any
    /// network calls of its own. A cool-down after a successful refresh
    /// serves the cached state; `set_needs_update` clears it.
    pub async fn update(&self) -> Result<WalletSummary, WalletError> {
        let entry_generation = self.generation.load(Ordering::SeqCst);
        let mut gate = self.gate.lock().await;

        // A refresh completed while this call waited on the gate.
        if self.generation.load(Ordering::SeqCst) != entry_generation {
            return match &gate.last_failure {
                None => Ok(self.summary().await),
                Some(message) => Err(WalletError::Internal(message.clone())),
            };
        }

        if let Some(at) = gate.last_refresh {
            if at.elapsed() < REFRESH_COOLDOWN {
                log::debug!("{}: refresh throttled, serving cached state", self.ledger());
                return Ok(self.summary().await);
            }
        }

        gate.phase = LoadPhase::Loading;
        let result = self.refresh().await;
        self.generation.fetch_add(1, Ordering::SeqCst);

        match result {
            Ok(()) => {
                gate.phase = LoadPhase::Loaded;
                gate.last_refresh = Some(Instant::now());
                gate.last_failure = None;
                Ok(self.summary().await)
            }
            Err(err) => {
                gate.phase = LoadPhase::Failed;
                gate.last_failure = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Clear the cool-down so the next `update` call hits the network.
    pub async fn set_needs_update(&self) {
        self.gate.lock().await.last_refresh = None;
    }

    pub async fn load_phase(&self) -> LoadPhase {
        self.gate.lock().await.phase
    }

    async fn refresh(&self) -> Result<(), WalletError> {
        let (addresses, pending_hashes) = {
            let wallet = self.state.read().await;
            (wallet.addresses().to_vec(), wallet.pending_hashes())
        };

        let view = self.adapter.fetch_view(&addresses, &pending_hashes).await?;

        // All fields commit in one write so observers never see a
        // half-updated wallet.
        self.state.write().await.apply_view(view);
        Ok(())
    }

    /// Quote the fee schedule for an intended transfer against the current
    /// wallet state.
    pub async fn estimate_fee(&self, intent: &TransferIntent) -> Result<FeeSchedule, WalletError> {
        let wallet = self.state.read().await.clone();
        self.adapter.fee_schedule(&wallet, intent).await
    }

    /// Validate, build, sign externally, assemble and broadcast a transfer.
    ///
    /// Build, validation and signing failures are never retried; broadcast
    /// goes through the provider failover layer exactly once.
    pub async fn send(&self, intent: TransferIntent) -> Result<PendingTransaction, WalletError> {
        let wallet = self.state.read().await.clone();

        let violations = self.adapter.validate(&wallet, &intent);
        if !violations.is_empty() {
            return Err(WalletError::Validation(violations));
        }

        let payload = self.adapter.build_for_sign(&wallet, &intent)?;
        let signature = self
            .signer
            .sign(self.ledger().curve(), &payload.digest, &wallet.public_key)
            .await?;
        let raw = self.adapter.build_for_send(&payload, &signature)?;
        let hash = self.adapter.broadcast(&raw).await?;

        let pending = PendingTransaction {
            hash,
            amount: intent.amount.clone(),
            fee: intent.fee.amount.clone(),
            source: intent.source.clone(),
            destination: intent.destination.clone(),
            date: chrono::Utc::now(),
            status: TxStatus::Unconfirmed,
        };
        self.state.write().await.add_pending(pending.clone());

        Ok(pending)
    }

    pub async fn summary(&self) -> WalletSummary {
        let wallet = self.state.read().await;
        WalletSummary {
            ledger: wallet.ledger,
            addresses: wallet.addresses().to_vec(),
            balances: wallet.balances().cloned().collect(),
            pending: wallet.pending_outgoing_transactions().to_vec(),
            is_empty: wallet.is_empty(),
        }
    }

    /// Read-only snapshot of the wallet state for builders and tests.
    pub async fn wallet(&self) -> Wallet {
        self.state.read().await.clone()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub ledger: Ledger,
    pub addresses: Vec<String>,
    pub balances: Vec<Amount>,
    pub pending: Vec<PendingTransaction>,
    pub is_empty: bool,
}
